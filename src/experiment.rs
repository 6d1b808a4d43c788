use crate::error::TyphoidError;
use crate::platform::Platform;
use crate::sweep::{Simulation, SimulationBuilder, SimulationStatus};
use crate::task::EmodTask;
use csv::Writer;
use indexmap::IndexSet;
use log::info;
use serde_json::Value;
use std::fs::{create_dir_all, File};
use std::path::Path;
use uuid::Uuid;

/// A named group of simulations built from one task and one sweep.
#[derive(Debug)]
pub struct Experiment {
    id: Uuid,
    name: String,
    task: EmodTask,
    simulations: Vec<Simulation>,
}

impl Experiment {
    /// # Errors
    /// Returns the first error raised by a sweep callback.
    pub fn from_builder(
        builder: &SimulationBuilder,
        task: EmodTask,
        name: &str,
    ) -> Result<Self, TyphoidError> {
        let simulations = builder.build(&task.config)?;
        let experiment = Experiment {
            id: Uuid::new_v4(),
            name: name.to_string(),
            task,
            simulations,
        };
        info!(
            "experiment {} ({}) has {} simulations",
            experiment.name,
            experiment.id,
            experiment.simulations.len()
        );
        Ok(experiment)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task(&self) -> &EmodTask {
        &self.task
    }

    pub fn simulations(&self) -> &[Simulation] {
        &self.simulations
    }

    pub(crate) fn parts_mut(&mut self) -> (&EmodTask, &mut [Simulation]) {
        (&self.task, &mut self.simulations)
    }

    /// Submits the experiment to `platform`, blocking until every simulation has finished when
    /// `wait_until_done` is set.
    ///
    /// # Errors
    /// Returns the platform's error if the simulations could not be submitted or awaited.
    pub fn run(
        &mut self,
        platform: &mut dyn Platform,
        wait_until_done: bool,
    ) -> Result<(), TyphoidError> {
        platform.run(self)?;
        if wait_until_done {
            platform.wait(self)?;
        }
        Ok(())
    }

    pub fn succeeded(&self) -> bool {
        self.simulations
            .iter()
            .all(|sim| sim.status == SimulationStatus::Succeeded)
    }

    /// Writes one row per simulation: its id, status and tags. Tags missing from a simulation
    /// are left empty.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn cache_metadata(&self, path: &Path) -> Result<(), TyphoidError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent)?;
        }
        let tag_names: IndexSet<&String> = self
            .simulations
            .iter()
            .flat_map(|sim| sim.tags.keys())
            .collect();

        let mut writer = Writer::from_writer(File::create(path)?);
        let mut header = vec!["simulation_id".to_string(), "status".to_string()];
        header.extend(tag_names.iter().map(|name| (*name).clone()));
        writer.write_record(&header)?;
        for sim in &self.simulations {
            let mut row = vec![sim.id.to_string(), sim.status.to_string()];
            row.extend(tag_names.iter().map(|name| match sim.tags.get(*name) {
                Some(Value::String(text)) => text.clone(),
                Some(value) => value.to_string(),
                None => String::new(),
            }));
            writer.write_record(&row)?;
        }
        writer.flush()?;
        info!("cached metadata for experiment {} in {}", self.id, path.display());
        Ok(())
    }
}
