//! The "start here" workflow: a typhoid config, a one-outbreak campaign and a single-node
//! demographics file, swept over five random seeds and run on the local platform. Once the
//! simulations finish, the driver fetches each `InsetChart.json` and summarises the `Infected`
//! channel.
use crate::campaign::Campaign;
use crate::channel_reports::{self, INSET_CHART_FILENAME};
use crate::config::Config;
use crate::demographics::{Demographics, WorldBankTable};
use crate::error::TyphoidError;
use crate::experiment::Experiment;
use crate::interventions::outbreak;
use crate::manifest::Manifest;
use crate::platform::{LocalPlatform, Platform};
use crate::schema::Schema;
use crate::sweep::{Simulation, SimulationBuilder, Tags};
use crate::task::{EmodTask, TaskSpec};
use log::info;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub const EXPERIMENT_NAME: &str = "Typhoid Hello World";
pub const SUMMARY_CHANNEL: &str = "Infected";
pub const METADATA_FILENAME: &str = "metadata.csv";
const NUM_SEEDS: u32 = 5;
const REPORTERS_RELATIVE_PATH: &str = "reporter_plugins";
const WORLD_BANK_COUNTRY: &str = "Chile";
const WORLD_BANK_YEAR: u16 = 2005;

/// Sweep callback: sets `Base_Infectivity_Constant` to a tenth of `value`.
///
/// # Errors
/// Returns a schema error if the result is out of range.
pub fn update_sim_bic(simulation: &mut Simulation, value: &f64) -> Result<Tags, TyphoidError> {
    simulation
        .config
        .set("Base_Infectivity_Constant", value * 0.1)?;
    Ok(Tags::from([("Base_Infectivity".to_string(), json!(value))]))
}

/// Sweep callback: sets the random seed.
///
/// # Errors
/// Returns a schema error if the seed is out of range.
pub fn update_sim_random_seed(
    simulation: &mut Simulation,
    value: &u32,
) -> Result<Tags, TyphoidError> {
    simulation.config.set("Run_Number", *value)?;
    Ok(Tags::from([("Run_Number".to_string(), json!(value))]))
}

/// # Errors
/// Returns a schema error if the schema lacks one of the parameters.
pub fn set_param_fn(config: &mut Config) -> Result<(), TyphoidError> {
    config.set("Simulation_Type", "TYPHOID_SIM")?;
    config.set("Simulation_Duration", 365.0)?;
    config.set("Base_Individual_Sample_Rate", 0.25)?;
    config.set("Minimum_End_Time", 90)?;
    // The schema defaults fall outside the reporting window a typhoid run needs.
    config.set("Inset_Chart_Reporting_Start_Year", 1850)?;
    config.set("Inset_Chart_Reporting_Stop_Year", 2050)?;
    config.set("Enable_Demographics_Reporting", 0)?;
    Ok(())
}

/// A campaign with a single outbreak on day 1, targeting the whole population.
///
/// # Errors
/// Returns an error if the schema has no outbreak intervention.
pub fn build_camp(schema: Arc<Schema>) -> Result<Campaign, TyphoidError> {
    info!(
        "building campaign with schema {}",
        schema
            .path()
            .map_or_else(|| "<in memory>".to_string(), |p| p.display().to_string())
    );
    let mut camp = Campaign::new(schema);
    let event = outbreak::new_intervention(&mut camp, 1.0, 1)?;
    camp.add(event, false);
    Ok(camp)
}

/// One node of 10000 people at equilibrium with Chile's 2005 crude birth rate.
///
/// # Errors
/// Returns an error if the World Bank table cannot be read or lacks the value.
pub fn build_demog(world_bank_dataset: &Path) -> Result<Demographics, TyphoidError> {
    let mut demog = Demographics::from_template_node(0.0, 0.0, 10000, "1", 1);
    let table = WorldBankTable::from_path(world_bank_dataset)?;
    demog.set_equilibrium_vital_dynamics_from_world_bank(
        &table,
        WORLD_BANK_COUNTRY,
        WORLD_BANK_YEAR,
    )?;
    Ok(demog)
}

/// What a finished run left behind.
#[derive(Debug)]
pub struct RunSummary {
    pub experiment_id: Uuid,
    /// Downloaded outputs of every simulation.
    pub output_directory: PathBuf,
    pub metadata: PathBuf,
    /// Per-timestep `Infected` table.
    pub channel_summary: PathBuf,
    pub means: Vec<f64>,
}

/// The task of the workflow: typhoid config, outbreak campaign and Chile demographics, plus the
/// manifest's reporter plugins and container image.
///
/// # Errors
/// Returns the first error from loading the schema or building the inputs.
pub fn build_task(manifest: &Manifest) -> Result<EmodTask, TyphoidError> {
    let world_bank_dataset = manifest.world_bank_dataset.clone();
    let mut task = EmodTask::from_default(TaskSpec {
        eradication_path: manifest.eradication_path.clone(),
        schema_path: manifest.schema_file.clone(),
        campaign_builder: Some(Box::new(build_camp)),
        demog_builder: Some(Box::new(move || build_demog(&world_bank_dataset))),
        param_custom_cb: Some(Box::new(set_param_fn)),
    })?;

    if let Some(reporters) = &manifest.reporters {
        info!("adding asset dir {}", reporters.display());
        task.common_assets
            .add_directory(reporters, REPORTERS_RELATIVE_PATH)?;
    }
    if let Some(sif) = &manifest.sif {
        task.set_sif(sif);
    }
    Ok(task)
}

/// Builds the task from the manifest, runs the seed sweep and summarises the results.
///
/// # Errors
/// Returns the first error from building the inputs, running the experiment or reading its
/// outputs. An experiment with failed simulations is an error.
pub fn run_test(manifest: &Manifest) -> Result<RunSummary, TyphoidError> {
    let mut platform = LocalPlatform::new(&manifest.job_directory, manifest.max_concurrent);
    let task = build_task(manifest)?;

    let mut builder = SimulationBuilder::new();
    builder.add_sweep_definition(update_sim_random_seed, 0..NUM_SEEDS);

    let mut experiment = Experiment::from_builder(&builder, task, EXPERIMENT_NAME)?;
    experiment.run(&mut platform, true)?;
    EmodTask::handle_experiment_completion(&experiment)?;

    platform.get_files(&experiment, &[INSET_CHART_FILENAME], &manifest.output_directory)?;
    let output_directory = manifest
        .output_directory
        .join(experiment.id().to_string());
    let metadata = output_directory.join(METADATA_FILENAME);
    experiment.cache_metadata(&metadata)?;

    let series = channel_reports::collect(&output_directory, SUMMARY_CHANNEL)?;
    let channel_summary = output_directory.join(format!("{SUMMARY_CHANNEL}.csv"));
    let means = channel_reports::display(&series, &channel_summary)?;

    Ok(RunSummary {
        experiment_id: experiment.id(),
        output_directory,
        metadata,
        channel_summary,
        means,
    })
}
