//! Summaries of the model's `InsetChart.json` output.
//!
//! After [`Platform::get_files`](crate::platform::Platform::get_files) has downloaded the chart of
//! every simulation into `<dir>/<simulation id>/InsetChart.json`, [`collect`] gathers one channel
//! across simulations and [`display`] writes it, with the per-timestep mean, as a CSV table.
use crate::error::TyphoidError;
use csv::Writer;
use indexmap::IndexMap;
use log::{info, warn};
use serde::Deserialize;
use std::fs::{self, create_dir_all, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const INSET_CHART_FILENAME: &str = "InsetChart.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChartHeader {
    #[serde(default)]
    pub timesteps: Option<u32>,
    #[serde(default)]
    pub simulation_timestep: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Channel {
    #[serde(default)]
    pub units: String,
    pub data: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InsetChart {
    pub header: ChartHeader,
    pub channels: IndexMap<String, Channel>,
}

impl InsetChart {
    /// # Errors
    /// Returns an error if the file cannot be read or is not an inset chart.
    pub fn from_path(path: &Path) -> Result<Self, TyphoidError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// # Errors
    /// Returns an error if the chart has no channel called `name`.
    pub fn channel(&self, name: &str) -> Result<&Channel, TyphoidError> {
        self.channels.get(name).ok_or_else(|| {
            TyphoidError::TyphoidError(format!("inset chart has no channel {name}"))
        })
    }
}

/// Reads channel `channel` from every `<sim>/InsetChart.json` directly under `dir`, keyed by the
/// simulation directory name. Simulations are ordered by name.
///
/// # Errors
/// Returns an error if a chart cannot be read or lacks the channel, or if `dir` holds no charts.
pub fn collect(dir: &Path, channel: &str) -> Result<IndexMap<String, Vec<f64>>, TyphoidError> {
    let mut charts: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let chart = entry.path().join(INSET_CHART_FILENAME);
        if chart.is_file() {
            charts.push((entry.file_name().to_string_lossy().into_owned(), chart));
        }
    }
    if charts.is_empty() {
        return Err(TyphoidError::TyphoidError(format!(
            "no {INSET_CHART_FILENAME} found under {}",
            dir.display()
        )));
    }
    charts.sort();

    let mut collected = IndexMap::new();
    for (simulation, path) in charts {
        let chart = InsetChart::from_path(&path)?;
        collected.insert(simulation, chart.channel(channel)?.data.clone());
    }
    info!(
        "collected {channel} from {} simulations in {}",
        collected.len(),
        dir.display()
    );
    Ok(collected)
}

/// Per-timestep mean over all series. Series shorter than the longest one only contribute to the
/// timesteps they cover.
pub fn means(series: &IndexMap<String, Vec<f64>>) -> Vec<f64> {
    let length = series.values().map(Vec::len).max().unwrap_or(0);
    (0..length)
        .map(|t| {
            let values: Vec<f64> = series.values().filter_map(|s| s.get(t).copied()).collect();
            #[allow(clippy::cast_precision_loss)]
            let count = values.len() as f64;
            values.iter().sum::<f64>() / count
        })
        .collect()
}

/// Writes `timestep,mean,<simulation...>` rows to `output` and returns the means.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn display(
    series: &IndexMap<String, Vec<f64>>,
    output: &Path,
) -> Result<Vec<f64>, TyphoidError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }
    let lengths: Vec<usize> = series.values().map(Vec::len).collect();
    if lengths.windows(2).any(|pair| pair[0] != pair[1]) {
        warn!("channel series have different lengths: {lengths:?}");
    }
    let means = means(series);

    let mut writer = Writer::from_writer(File::create(output)?);
    let mut header = vec!["timestep".to_string(), "mean".to_string()];
    header.extend(series.keys().cloned());
    writer.write_record(&header)?;
    for (t, mean) in means.iter().enumerate() {
        let mut row = vec![t.to_string(), mean.to_string()];
        row.extend(
            series
                .values()
                .map(|s| s.get(t).map(ToString::to_string).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }
    writer.flush()?;
    info!("wrote channel summary to {}", output.display());
    Ok(means)
}
