//! Execution platforms.
//!
//! A [`Platform`] takes an [`Experiment`], lays out one working directory per simulation and runs
//! the model in each. [`LocalPlatform`] does this on the current machine, running at most
//! `max_concurrent` model processes at a time.
use crate::error::TyphoidError;
use crate::experiment::Experiment;
use crate::sweep::SimulationStatus;
use crate::task::{EmodTask, CONFIG_FILENAME};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const OUTPUT_DIR: &str = "output";
pub const ASSETS_DIR: &str = "Assets";
const STDOUT_FILENAME: &str = "stdout.txt";
const STDERR_FILENAME: &str = "stderr.txt";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub trait Platform {
    /// Prepares every simulation of `experiment` and starts running them.
    ///
    /// # Errors
    /// Returns an error if the simulation inputs cannot be written.
    fn run(&mut self, experiment: &mut Experiment) -> Result<(), TyphoidError>;

    /// Blocks until every simulation started by [`Platform::run`] has finished, recording each
    /// one's status on `experiment`.
    ///
    /// # Errors
    /// Returns an error if waiting on a simulation fails.
    fn wait(&mut self, experiment: &mut Experiment) -> Result<(), TyphoidError>;

    /// Copies `files` from each simulation's outputs into `dest/<experiment id>/<simulation id>/`
    /// and returns the copied paths.
    ///
    /// # Errors
    /// Returns `PlatformError` if a simulation lacks one of the files.
    fn get_files(
        &self,
        experiment: &Experiment,
        files: &[&str],
        dest: &Path,
    ) -> Result<Vec<PathBuf>, TyphoidError>;
}

#[derive(Debug)]
pub struct LocalPlatform {
    job_directory: PathBuf,
    max_concurrent: usize,
    queued: VecDeque<(Uuid, PathBuf)>,
    running: VecDeque<(Uuid, Child)>,
}

impl LocalPlatform {
    pub fn new(job_directory: impl Into<PathBuf>, max_concurrent: usize) -> Self {
        LocalPlatform {
            job_directory: job_directory.into(),
            max_concurrent: max_concurrent.max(1),
            queued: VecDeque::new(),
            running: VecDeque::new(),
        }
    }

    pub fn experiment_dir(&self, experiment: &Experiment) -> PathBuf {
        self.job_directory.join(experiment.id().to_string())
    }

    pub fn simulation_dir(&self, experiment: &Experiment, simulation_id: Uuid) -> PathBuf {
        self.experiment_dir(experiment)
            .join(simulation_id.to_string())
    }

    /// The model invocation for one simulation, run from inside its directory.
    pub(crate) fn command(task: &EmodTask, assets_dir: Option<&Path>) -> Command {
        let eradication =
            fs::canonicalize(&task.eradication_path).unwrap_or(task.eradication_path.clone());
        let mut command = match &task.sif {
            Some(sif) => {
                let mut command = Command::new("singularity");
                command.arg("exec").arg(sif).arg(&eradication);
                command
            }
            None => Command::new(&eradication),
        };
        command
            .arg("--config")
            .arg(CONFIG_FILENAME)
            .arg("--input-path")
            .arg(".")
            .arg("--output-path")
            .arg(OUTPUT_DIR);
        if let Some(assets_dir) = assets_dir {
            command.arg("--dll-path").arg(assets_dir);
        }
        command
    }

    fn start(
        &self,
        experiment: &Experiment,
        simulation_dir: &Path,
    ) -> Result<Child, TyphoidError> {
        let task = experiment.task();
        let assets_dir = self.experiment_dir(experiment).join(ASSETS_DIR);
        let assets_dir = (!task.common_assets.is_empty()).then_some(assets_dir.as_path());
        let mut command = Self::command(task, assets_dir);
        command
            .current_dir(simulation_dir)
            .stdout(File::create(simulation_dir.join(STDOUT_FILENAME))?)
            .stderr(File::create(simulation_dir.join(STDERR_FILENAME))?);
        debug!("starting {command:?}");
        Ok(command.spawn()?)
    }

    fn set_status(experiment: &mut Experiment, id: Uuid, status: SimulationStatus) {
        let (_, simulations) = experiment.parts_mut();
        if let Some(sim) = simulations.iter_mut().find(|sim| sim.id == id) {
            sim.status = status;
        }
    }

    /// Starts queued simulations until `max_concurrent` are running.
    fn fill_slots(&mut self, experiment: &mut Experiment) {
        while self.running.len() < self.max_concurrent {
            let Some((id, dir)) = self.queued.pop_front() else {
                break;
            };
            match self.start(experiment, &dir) {
                Ok(child) => {
                    Self::set_status(experiment, id, SimulationStatus::Running);
                    self.running.push_back((id, child));
                }
                Err(e) => {
                    error!("simulation {id} failed to start: {e}");
                    Self::set_status(experiment, id, SimulationStatus::Failed);
                }
            }
        }
    }

    /// Records the status of every finished simulation and starts queued ones in their place.
    fn reap(&mut self, experiment: &mut Experiment) -> Result<(), TyphoidError> {
        let mut index = 0;
        while index < self.running.len() {
            let (id, child) = &mut self.running[index];
            let id = *id;
            match child.try_wait()? {
                Some(exit) => {
                    let status = if exit.success() {
                        SimulationStatus::Succeeded
                    } else {
                        warn!("simulation {id} exited with {exit}");
                        SimulationStatus::Failed
                    };
                    Self::set_status(experiment, id, status);
                    self.running.remove(index);
                }
                None => index += 1,
            }
        }
        self.fill_slots(experiment);
        Ok(())
    }

    /// Kills every running simulation and marks it, and every queued one, as failed.
    fn abort(&mut self, experiment: &mut Experiment) {
        for (id, mut child) in self.running.drain(..) {
            if let Err(e) = child.kill() {
                warn!("could not kill simulation {id}: {e}");
            }
            if let Err(e) = child.wait() {
                warn!("could not reap simulation {id}: {e}");
            }
            Self::set_status(experiment, id, SimulationStatus::Failed);
        }
        for (id, _) in self.queued.drain(..) {
            Self::set_status(experiment, id, SimulationStatus::Failed);
        }
    }
}

impl Platform for LocalPlatform {
    fn run(&mut self, experiment: &mut Experiment) -> Result<(), TyphoidError> {
        fs::create_dir_all(&self.job_directory)?;
        self.job_directory = std::path::absolute(&self.job_directory)?;
        let experiment_dir = self.experiment_dir(experiment);
        let (task, simulations) = experiment.parts_mut();
        task.common_assets
            .materialize(&experiment_dir.join(ASSETS_DIR))?;
        for sim in simulations.iter() {
            let dir = experiment_dir.join(sim.id.to_string());
            task.write_inputs(&sim.config, &dir)?;
            self.queued.push_back((sim.id, dir));
        }
        info!(
            "experiment {} prepared in {}",
            experiment.id(),
            experiment_dir.display()
        );
        self.fill_slots(experiment);
        Ok(())
    }

    fn wait(&mut self, experiment: &mut Experiment) -> Result<(), TyphoidError> {
        let started = Instant::now();
        while !self.running.is_empty() {
            if let Err(e) = self.reap(experiment) {
                error!("lost track of experiment {}: {e}", experiment.id());
                self.abort(experiment);
                return Err(e);
            }
            if !self.running.is_empty() {
                thread::sleep(POLL_INTERVAL);
            }
        }
        info!(
            "experiment {} finished in {}",
            experiment.id(),
            humantime::format_duration(Duration::from_secs(started.elapsed().as_secs()))
        );
        Ok(())
    }

    fn get_files(
        &self,
        experiment: &Experiment,
        files: &[&str],
        dest: &Path,
    ) -> Result<Vec<PathBuf>, TyphoidError> {
        let mut copied = Vec::new();
        for sim in experiment.simulations() {
            let sim_dir = self.simulation_dir(experiment, sim.id);
            let target_dir = dest
                .join(experiment.id().to_string())
                .join(sim.id.to_string());
            fs::create_dir_all(&target_dir)?;
            for name in files {
                let source = [sim_dir.join(OUTPUT_DIR).join(name), sim_dir.join(name)]
                    .into_iter()
                    .find(|candidate| candidate.is_file())
                    .ok_or_else(|| {
                        TyphoidError::PlatformError(format!(
                            "simulation {} has no {name}",
                            sim.id
                        ))
                    })?;
                let target = target_dir.join(name);
                fs::copy(&source, &target)?;
                copied.push(target);
            }
        }
        info!(
            "copied {} files from experiment {}",
            copied.len(),
            experiment.id()
        );
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::{Simulation, SimulationBuilder, Tags};
    use crate::task::test_support::test_task;
    use serde_json::json;
    use tempfile::tempdir;

    fn experiment_with(task: EmodTask, seeds: u32) -> Experiment {
        let mut builder = SimulationBuilder::new();
        builder.add_sweep_definition(
            |sim: &mut Simulation, seed: &u32| {
                sim.config.set("Run_Number", *seed)?;
                Ok(Tags::from([("Run_Number".to_string(), json!(seed))]))
            },
            0..seeds,
        );
        Experiment::from_builder(&builder, task, "local").unwrap()
    }

    #[test]
    fn command_uses_container_when_sif_is_set() {
        let mut task = test_task();
        let command = LocalPlatform::command(&task, None);
        assert_eq!(command.get_program(), "Eradication");

        task.set_sif("model.sif");
        let command = LocalPlatform::command(&task, Some(Path::new("/assets")));
        assert_eq!(command.get_program(), "singularity");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args[..3], ["exec", "model.sif", "Eradication"]);
        assert_eq!(args[args.len() - 2..], ["--dll-path", "/assets"]);
    }

    #[test]
    fn missing_binary_fails_simulations() {
        let temp_dir = tempdir().unwrap();
        let mut task = test_task();
        task.eradication_path = temp_dir.path().join("no-such-binary");
        let mut experiment = experiment_with(task, 2);
        let mut platform = LocalPlatform::new(temp_dir.path().join("jobs"), 2);
        experiment.run(&mut platform, true).unwrap();

        assert!(experiment
            .simulations()
            .iter()
            .all(|sim| sim.status == SimulationStatus::Failed));
        let sim_dir = platform.simulation_dir(&experiment, experiment.simulations()[0].id);
        assert!(sim_dir.join(CONFIG_FILENAME).exists());
        assert!(EmodTask::handle_experiment_completion(&experiment).is_err());
    }

    #[cfg(unix)]
    fn write_script(path: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn local_run_and_file_retrieval() {
        let temp_dir = tempdir().unwrap();
        let script = temp_dir.path().join("Eradication");
        write_script(
            &script,
            "mkdir -p output\n\
             echo '{\"Header\": {\"Timesteps\": 2}, \"Channels\": {\"Infected\": {\"Data\": [0, 1]}}}' \
             > output/InsetChart.json",
        );
        let mut task = test_task();
        task.eradication_path = script;
        let mut experiment = experiment_with(task, 3);
        let mut platform = LocalPlatform::new(temp_dir.path().join("jobs"), 2);
        experiment.run(&mut platform, true).unwrap();
        assert!(experiment.succeeded());
        EmodTask::handle_experiment_completion(&experiment).unwrap();

        let dest = temp_dir.path().join("downloads");
        let copied = platform
            .get_files(&experiment, &["InsetChart.json"], &dest)
            .unwrap();
        assert_eq!(copied.len(), 3);
        assert!(copied.iter().all(|path| path.exists()));

        assert!(platform
            .get_files(&experiment, &["ReportTyphoid.csv"], &dest)
            .is_err());
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_marks_failure() {
        let temp_dir = tempdir().unwrap();
        let script = temp_dir.path().join("Eradication");
        write_script(&script, "exit 3");
        let mut task = test_task();
        task.eradication_path = script;
        let mut experiment = experiment_with(task, 1);
        let mut platform = LocalPlatform::new(temp_dir.path().join("jobs"), 1);
        experiment.run(&mut platform, true).unwrap();
        assert_eq!(
            experiment.simulations()[0].status,
            SimulationStatus::Failed
        );
    }

    #[cfg(unix)]
    #[test]
    fn slow_simulation_does_not_hold_up_the_queue() {
        let temp_dir = tempdir().unwrap();
        let script = temp_dir.path().join("Eradication");
        write_script(
            &script,
            "grep -q '\"Run_Number\": 0' config.json && exec sleep 3\nexec sleep 1",
        );
        let mut task = test_task();
        task.eradication_path = script;
        let mut experiment = experiment_with(task, 4);
        let mut platform = LocalPlatform::new(temp_dir.path().join("jobs"), 2);

        let started = Instant::now();
        experiment.run(&mut platform, true).unwrap();
        let elapsed = started.elapsed().as_secs_f64();
        assert!(experiment.succeeded());
        // The three short runs share the second slot while the long one runs.
        assert!(elapsed < 3.6, "took {elapsed}s");
    }

    #[cfg(unix)]
    #[test]
    fn abort_kills_running_and_fails_queued() {
        let temp_dir = tempdir().unwrap();
        let script = temp_dir.path().join("Eradication");
        write_script(&script, "exec sleep 30");
        let mut task = test_task();
        task.eradication_path = script;
        let mut experiment = experiment_with(task, 3);
        let mut platform = LocalPlatform::new(temp_dir.path().join("jobs"), 1);
        platform.run(&mut experiment).unwrap();
        assert_eq!(platform.running.len(), 1);
        assert_eq!(platform.queued.len(), 2);

        let started = Instant::now();
        platform.abort(&mut experiment);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(platform.running.is_empty());
        assert!(platform.queued.is_empty());
        assert!(experiment
            .simulations()
            .iter()
            .all(|sim| sim.status == SimulationStatus::Failed));
    }
}
