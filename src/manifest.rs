//! Where the model files live.
//!
//! A manifest is a small JSON file naming the schema, the model binary and the data the driver
//! needs. Every key is optional; missing keys take the conventional layout of a model download
//! directory (`stash/`).
use crate::error::TyphoidError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const DEFAULT_MANIFEST: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    pub schema_file: PathBuf,
    pub eradication_path: PathBuf,
    /// World Bank crude birth rate table.
    pub world_bank_dataset: PathBuf,
    /// Directory of reporter plugins shipped with every simulation.
    pub reporters: Option<PathBuf>,
    /// Container image the model runs in.
    pub sif: Option<PathBuf>,
    pub model_dl_dir: PathBuf,
    /// Root of the local platform's experiment directories.
    pub job_directory: PathBuf,
    /// Where simulation outputs are copied to.
    pub output_directory: PathBuf,
    pub max_concurrent: usize,
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest {
            schema_file: PathBuf::from("stash/schema.json"),
            eradication_path: PathBuf::from("stash/Eradication"),
            world_bank_dataset: PathBuf::from("Data/WB_crude_birthrate_by_year_and_country.csv"),
            reporters: None,
            sif: None,
            model_dl_dir: PathBuf::from("stash"),
            job_directory: PathBuf::from("experiments"),
            output_directory: PathBuf::from("downloads"),
            max_concurrent: std::thread::available_parallelism().map_or(1, usize::from),
        }
    }
}

impl Manifest {
    /// Reads a manifest, resolving relative paths against the manifest's own directory.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or has unknown keys.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TyphoidError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut manifest: Manifest = serde_json::from_reader(BufReader::new(file))?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            manifest.rebase(base);
        }
        debug!("loaded manifest {}: {manifest:?}", path.display());
        Ok(manifest)
    }

    /// Loads `path` if it exists and falls back to the defaults otherwise.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, TyphoidError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!("no manifest at {}, using defaults", path.display());
            Ok(Manifest::default())
        }
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.schema_file);
        join(&mut self.eradication_path);
        join(&mut self.world_bank_dataset);
        join(&mut self.model_dl_dir);
        join(&mut self.job_directory);
        join(&mut self.output_directory);
        if let Some(reporters) = &mut self.reporters {
            join(reporters);
        }
        if let Some(sif) = &mut self.sif {
            join(sif);
        }
    }

    /// Checks that the model binary and its schema are in place.
    ///
    /// # Errors
    /// Returns `PlatformError` naming the missing files and the download directory they belong in.
    pub fn check_model(&self) -> Result<(), TyphoidError> {
        let missing: Vec<String> = [&self.eradication_path, &self.schema_file]
            .into_iter()
            .filter(|path| !path.is_file())
            .map(|path| path.display().to_string())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(TyphoidError::PlatformError(format!(
            "model files missing: {}; place the model build in {}",
            missing.join(", "),
            self.model_dl_dir.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_keys_take_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("manifest.json");
        fs::write(&path, r#"{"sif": "/images/dtk.sif", "max_concurrent": 2}"#).unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.sif, Some(PathBuf::from("/images/dtk.sif")));
        assert_eq!(manifest.max_concurrent, 2);
        assert_eq!(manifest.schema_file, temp_dir.path().join("stash/schema.json"));
        assert_eq!(manifest.reporters, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("manifest.json");
        fs::write(&path, r#"{"schema": "schema.json"}"#).unwrap();
        assert!(matches!(
            Manifest::load(&path),
            Err(TyphoidError::JsonError(_))
        ));
    }

    #[test]
    fn absent_manifest_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let manifest = Manifest::load_or_default(temp_dir.path().join("nope.json")).unwrap();
        assert_eq!(manifest.eradication_path, PathBuf::from("stash/Eradication"));
    }

    #[test]
    fn check_model_names_missing_files() {
        let temp_dir = tempdir().unwrap();
        let manifest = Manifest {
            schema_file: temp_dir.path().join("schema.json"),
            eradication_path: temp_dir.path().join("Eradication"),
            ..Manifest::default()
        };
        let Err(TyphoidError::PlatformError(message)) = manifest.check_model() else {
            panic!("expected a platform error");
        };
        assert!(message.contains("Eradication"));
        assert!(message.contains("schema.json"));

        fs::write(&manifest.schema_file, "{}").unwrap();
        fs::write(&manifest.eradication_path, "").unwrap();
        assert!(manifest.check_model().is_ok());
    }
}
