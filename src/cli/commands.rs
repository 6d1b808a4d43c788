use std::path::Path;

use anyhow::{Context as _, Result};
use emod_typhoid::campaign::Campaign;
use emod_typhoid::driver;
use emod_typhoid::interventions::carrier_clear;
use emod_typhoid::manifest::Manifest;

pub fn campaign(manifest: &Manifest, start_day: f64, output: Option<&Path>) -> Result<()> {
    let mut camp = Campaign::with_schema_file(&manifest.schema_file)
        .with_context(|| format!("loading schema {}", manifest.schema_file.display()))?;
    let written = carrier_clear::new_intervention_as_file(&mut camp, start_day, output)?;
    println!("{}", written.display());
    Ok(())
}

pub fn inputs(manifest: &Manifest, dir: &Path) -> Result<()> {
    let task = driver::build_task(manifest)?;
    task.write_inputs(&task.config, dir)?;
    println!("{}", dir.display());
    Ok(())
}

pub fn run(manifest: &Manifest) -> Result<()> {
    manifest.check_model()?;
    let summary = driver::run_test(manifest)?;
    println!("experiment {}", summary.experiment_id);
    println!("metadata: {}", summary.metadata.display());
    println!(
        "{} summary: {}",
        driver::SUMMARY_CHANNEL,
        summary.channel_summary.display()
    );
    if let Some(last) = summary.means.last() {
        println!("final mean {}: {last}", driver::SUMMARY_CHANNEL);
    }
    Ok(())
}
