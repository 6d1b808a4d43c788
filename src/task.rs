//! An `EmodTask` bundles everything one model run needs: the model binary, its schema, the
//! simulation config, campaign, demographics and any shared assets. Simulations in a sweep share
//! the task and differ only in their config.
use crate::campaign::Campaign;
use crate::config::Config;
use crate::demographics::Demographics;
use crate::error::TyphoidError;
use crate::experiment::Experiment;
use crate::schema::Schema;
use crate::sweep::SimulationStatus;
use log::{debug, error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CONFIG_FILENAME: &str = "config.json";
pub const CAMPAIGN_FILENAME: &str = "campaign.json";
pub const DEMOGRAPHICS_FILENAME: &str = "demographics.json";

pub type ConfigCallback = Box<dyn Fn(&mut Config) -> Result<(), TyphoidError>>;
pub type CampaignBuilder = Box<dyn Fn(Arc<Schema>) -> Result<Campaign, TyphoidError>>;
pub type DemographicsBuilder = Box<dyn Fn() -> Result<Demographics, TyphoidError>>;

/// A file shipped alongside every simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub source: PathBuf,
    /// Directory under the assets root the file is placed in.
    pub relative_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct AssetCollection {
    assets: Vec<Asset>,
}

impl AssetCollection {
    pub fn add_asset(&mut self, source: impl Into<PathBuf>, relative_path: impl Into<PathBuf>) {
        self.assets.push(Asset {
            source: source.into(),
            relative_path: relative_path.into(),
        });
    }

    /// Adds every file under `assets_directory`, keeping its layout below `relative_path`.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    pub fn add_directory(
        &mut self,
        assets_directory: impl AsRef<Path>,
        relative_path: impl AsRef<Path>,
    ) -> Result<(), TyphoidError> {
        let root = assets_directory.as_ref();
        let mut pending = vec![(root.to_path_buf(), relative_path.as_ref().to_path_buf())];
        while let Some((dir, relative)) = pending.pop() {
            let mut entries = fs::read_dir(&dir)?.collect::<Result<Vec<_>, _>>()?;
            entries.sort_by_key(fs::DirEntry::file_name);
            for entry in entries {
                let path = entry.path();
                if path.is_dir() {
                    pending.push((path, relative.join(entry.file_name())));
                } else {
                    self.add_asset(path, relative.clone());
                }
            }
        }
        debug!("asset collection holds {} files", self.assets.len());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Asset> {
        self.assets.iter()
    }

    /// Copies every asset below `root`.
    ///
    /// # Errors
    /// Returns an error if a file cannot be copied.
    pub fn materialize(&self, root: &Path) -> Result<(), TyphoidError> {
        for asset in &self.assets {
            let dir = root.join(&asset.relative_path);
            fs::create_dir_all(&dir)?;
            let Some(name) = asset.source.file_name() else {
                return Err(TyphoidError::TyphoidError(format!(
                    "asset {} has no file name",
                    asset.source.display()
                )));
            };
            fs::copy(&asset.source, dir.join(name))?;
        }
        Ok(())
    }
}

/// Inputs for [`EmodTask::from_default`].
pub struct TaskSpec {
    pub eradication_path: PathBuf,
    pub schema_path: PathBuf,
    pub campaign_builder: Option<CampaignBuilder>,
    pub demog_builder: Option<DemographicsBuilder>,
    pub param_custom_cb: Option<ConfigCallback>,
}

#[derive(Debug, Clone)]
pub struct EmodTask {
    pub eradication_path: PathBuf,
    pub schema: Arc<Schema>,
    pub config: Config,
    pub campaign: Option<Campaign>,
    pub demographics: Option<Demographics>,
    pub common_assets: AssetCollection,
    /// Container image the model runs in, if any.
    pub sif: Option<PathBuf>,
}

impl EmodTask {
    /// Loads the schema, builds a default config, runs the caller's config callback and builders,
    /// then applies whatever config changes the campaign and demographics imply.
    ///
    /// # Errors
    /// Returns the first error from loading the schema, a callback or a builder.
    pub fn from_default(spec: TaskSpec) -> Result<Self, TyphoidError> {
        let schema = Schema::load(&spec.schema_path)?;
        let mut config = Config::from_schema(Arc::clone(&schema))?;
        if let Some(callback) = &spec.param_custom_cb {
            callback(&mut config)?;
        }

        let campaign = match &spec.campaign_builder {
            Some(builder) => Some(builder(Arc::clone(&schema))?),
            None => None,
        };
        if let Some(campaign) = &campaign {
            config.set("Enable_Interventions", 1)?;
            config.set("Campaign_Filename", CAMPAIGN_FILENAME)?;
            config.add_custom_events(&campaign.custom_events())?;
        }

        let demographics = match &spec.demog_builder {
            Some(builder) => Some(builder()?),
            None => None,
        };
        if let Some(demographics) = &demographics {
            for implicit in demographics.implicits() {
                config.apply(implicit)?;
            }
            config.set("Demographics_Filenames", vec![DEMOGRAPHICS_FILENAME])?;
        }

        info!(
            "task ready: campaign {}, demographics {}",
            campaign.is_some(),
            demographics.is_some()
        );
        Ok(EmodTask {
            eradication_path: spec.eradication_path,
            schema,
            config,
            campaign,
            demographics,
            common_assets: AssetCollection::default(),
            sif: None,
        })
    }

    pub fn set_sif(&mut self, sif: impl Into<PathBuf>) {
        self.sif = Some(sif.into());
    }

    /// Writes the task's input files into `dir`, using `config` in place of the task config.
    ///
    /// # Errors
    /// Returns an error if any file cannot be written.
    pub fn write_inputs(&self, config: &Config, dir: &Path) -> Result<(), TyphoidError> {
        fs::create_dir_all(dir)?;
        let mut config = config.clone();
        config.finalize();
        config.save(dir.join(CONFIG_FILENAME))?;
        if let Some(campaign) = &self.campaign {
            campaign.save(dir.join(CAMPAIGN_FILENAME))?;
        }
        if let Some(demographics) = &self.demographics {
            demographics.save(dir.join(DEMOGRAPHICS_FILENAME))?;
        }
        Ok(())
    }

    /// Fails if any simulation of `experiment` did not succeed.
    ///
    /// # Errors
    /// Returns `PlatformError` listing the simulations that did not succeed.
    pub fn handle_experiment_completion(experiment: &Experiment) -> Result<(), TyphoidError> {
        let unfinished: Vec<String> = experiment
            .simulations()
            .iter()
            .filter(|sim| sim.status != SimulationStatus::Succeeded)
            .map(|sim| format!("{} ({})", sim.id, sim.status))
            .collect();
        if unfinished.is_empty() {
            info!("experiment {} succeeded", experiment.id());
            return Ok(());
        }
        error!(
            "experiment {} has {} simulations that did not succeed",
            experiment.id(),
            unfinished.len()
        );
        Err(TyphoidError::PlatformError(format!(
            "experiment {} did not succeed: {}",
            experiment.id(),
            unfinished.join(", ")
        )))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::test_task;
    use super::*;
    use crate::schema::test_support::TEST_SCHEMA;
    use serde_json::{json, Value};
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn from_default_applies_implicits() {
        let task = test_task();
        let config = &task.config;
        assert_eq!(config.get("Simulation_Type"), Some(&json!("TYPHOID_SIM")));
        assert_eq!(config.get("Enable_Interventions"), Some(&json!(1)));
        assert_eq!(config.get("Campaign_Filename"), Some(&json!("campaign.json")));
        assert_eq!(config.get("Custom_Individual_Events"), Some(&json!(["Cleared"])));
        assert_eq!(
            config.get("Demographics_Filenames"),
            Some(&json!(["demographics.json"]))
        );
        assert_eq!(
            config.get("Birth_Rate_Dependence"),
            Some(&json!("POPULATION_DEP_RATE"))
        );
    }

    #[test]
    fn callback_errors_propagate() {
        let result = EmodTask::from_default(TaskSpec {
            eradication_path: PathBuf::from("Eradication"),
            schema_path: PathBuf::from(TEST_SCHEMA),
            campaign_builder: None,
            demog_builder: None,
            param_custom_cb: Some(Box::new(
                |config: &mut Config| -> Result<(), TyphoidError> {
                    config.set("Not_A_Parameter", 1)?;
                    Ok(())
                },
            )),
        });
        assert!(matches!(result, Err(TyphoidError::SchemaError(_))));
    }

    #[test]
    fn write_inputs_writes_finalized_files() {
        let temp_dir = tempdir().unwrap();
        let task = test_task();
        task.write_inputs(&task.config, temp_dir.path()).unwrap();
        for name in [CONFIG_FILENAME, CAMPAIGN_FILENAME, DEMOGRAPHICS_FILENAME] {
            assert!(temp_dir.path().join(name).exists(), "{name} missing");
        }
        let config: Value =
            serde_json::from_reader(File::open(temp_dir.path().join(CONFIG_FILENAME)).unwrap())
                .unwrap();
        let parameters = &config["parameters"];
        assert_eq!(parameters["Typhoid_Carrier_Probability"], json!(0.1));
        assert_eq!(parameters["Enable_Natural_Mortality"], json!(1));
        // The task config itself is left untouched.
        assert!(task.config.get("Enable_Natural_Mortality").is_some());
    }

    #[test]
    fn asset_directories_keep_their_layout() {
        let temp_dir = tempdir().unwrap();
        let source = temp_dir.path().join("plugins");
        fs::create_dir_all(source.join("nested")).unwrap();
        fs::write(source.join("a.so"), b"a").unwrap();
        fs::write(source.join("nested").join("b.so"), b"b").unwrap();

        let mut assets = AssetCollection::default();
        assets.add_directory(&source, "reporter_plugins").unwrap();
        let target = temp_dir.path().join("Assets");
        assets.materialize(&target).unwrap();
        assert!(target.join("reporter_plugins").join("a.so").exists());
        assert!(target
            .join("reporter_plugins")
            .join("nested")
            .join("b.so")
            .exists());
    }
}
