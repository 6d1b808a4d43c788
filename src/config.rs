//! Simulation configuration (`config.json`).
//!
//! A [`Config`] starts with every parameter of the schema's `config` section at its default.
//! Callers then assign the handful they care about. Before the file is written,
//! [`Config::finalize`] drops parameters whose `depends-on` conditions are not met, so the model
//! only sees parameters that are meaningful for the chosen settings.
use crate::error::{SchemaError, TyphoidError};
use crate::schema::Schema;
use indexmap::IndexSet;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CONFIG_CLASS: &str = "config";

/// A config change implied by a choice made while building demographics or a campaign.
#[derive(Debug, Clone, PartialEq)]
pub enum Implicit {
    /// Births scale with the current population.
    PopulationDependentBirthRate,
    /// Natural deaths follow the age- and gender-specific mortality distribution.
    MortalityByAgeAndGender,
    /// Any other single-parameter assignment.
    Set { parameter: String, value: Value },
}

#[derive(Debug, Clone)]
pub struct Config {
    schema: Arc<Schema>,
    parameters: Map<String, Value>,
    explicit: IndexSet<String>,
}

impl Config {
    /// Creates a config with every schema parameter at its default.
    ///
    /// # Errors
    /// Returns `SchemaError::Malformed` if the schema has no `config` section.
    pub fn from_schema(schema: Arc<Schema>) -> Result<Self, TyphoidError> {
        let parameters = schema.config_defaults()?;
        debug!("config starts with {} default parameters", parameters.len());
        Ok(Config {
            schema,
            parameters,
            explicit: IndexSet::new(),
        })
    }

    pub fn get(&self, parameter: &str) -> Option<&Value> {
        self.parameters.get(parameter)
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Assigns `parameter`, validating it against the schema's `config` section.
    ///
    /// # Errors
    /// Returns `SchemaError::UnknownParameter` if the schema does not declare `parameter`, or the
    /// validation error if the value is not acceptable.
    pub fn set(&mut self, parameter: &str, value: impl Into<Value>) -> Result<(), SchemaError> {
        let spec = self
            .schema
            .config_spec(parameter)
            .ok_or_else(|| SchemaError::UnknownParameter {
                class: CONFIG_CLASS.to_string(),
                parameter: parameter.to_string(),
            })?;
        let value = spec.validate(parameter, value.into())?;
        self.parameters.insert(parameter.to_string(), value);
        self.explicit.insert(parameter.to_string());
        Ok(())
    }

    /// # Errors
    /// Returns an error if the schema rejects any of the implied assignments.
    pub fn apply(&mut self, implicit: &Implicit) -> Result<(), SchemaError> {
        debug!("applying implicit {implicit:?}");
        match implicit {
            Implicit::PopulationDependentBirthRate => {
                self.set("Enable_Vital_Dynamics", 1)?;
                self.set("Enable_Birth", 1)?;
                self.set("Birth_Rate_Dependence", "POPULATION_DEP_RATE")
            }
            Implicit::MortalityByAgeAndGender => {
                self.set("Enable_Vital_Dynamics", 1)?;
                self.set("Enable_Natural_Mortality", 1)?;
                self.set("Death_Rate_Dependence", "NONDISEASE_MORTALITY_BY_AGE_AND_GENDER")
            }
            Implicit::Set { parameter, value } => self.set(parameter, value.clone()),
        }
    }

    /// Adds `events` to `Custom_Individual_Events`, skipping names already present.
    ///
    /// # Errors
    /// Returns an error if the schema has no `Custom_Individual_Events` parameter.
    pub fn add_custom_events(&mut self, events: &[String]) -> Result<(), SchemaError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut merged: IndexSet<String> = self
            .get("Custom_Individual_Events")
            .and_then(Value::as_array)
            .map(|current| {
                current
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        merged.extend(events.iter().cloned());
        let merged: Vec<Value> = merged.into_iter().map(Value::String).collect();
        self.set("Custom_Individual_Events", merged)
    }

    /// Removes parameters whose `depends-on` conditions are not satisfied and returns their names.
    /// Removal repeats until stable, since dropping one parameter can invalidate others.
    pub fn finalize(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        loop {
            let unmet: Vec<String> = self
                .parameters
                .keys()
                .filter(|name| !self.dependencies_met(name))
                .cloned()
                .collect();
            if unmet.is_empty() {
                break;
            }
            for name in unmet {
                self.parameters.remove(&name);
                if self.explicit.contains(&name) {
                    warn!("{name} was set but is not used with the current settings; dropping it");
                }
                dropped.push(name);
            }
        }
        debug!("finalize dropped {} parameters", dropped.len());
        dropped
    }

    fn dependencies_met(&self, parameter: &str) -> bool {
        let Some(conditions) = self
            .schema
            .config_spec(parameter)
            .and_then(|spec| spec.depends_on())
        else {
            return true;
        };
        conditions.iter().all(|(other, expected)| {
            self.parameters
                .get(other)
                .is_some_and(|actual| condition_matches(expected, actual))
        })
    }

    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "parameters".to_string(),
            Value::Object(self.parameters.clone()),
        );
        Value::Object(root)
    }

    /// Writes `{"parameters": {...}}` to `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf, TyphoidError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.to_json())?;
        info!("wrote config to {}", path.display());
        Ok(path.to_path_buf())
    }
}

/// A string condition lists the accepted values separated by commas; anything else must compare
/// equal numerically.
fn condition_matches(expected: &Value, actual: &Value) -> bool {
    match expected {
        Value::String(accepted) => actual
            .as_str()
            .is_some_and(|actual| accepted.split(',').any(|option| option.trim() == actual)),
        Value::Bool(flag) => actual.as_f64() == Some(f64::from(u8::from(*flag))),
        Value::Number(n) => n.as_f64().is_some() && actual.as_f64() == n.as_f64(),
        other => other == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::test_support::test_schema;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn set_validates_against_config_section() {
        let mut config = Config::from_schema(test_schema()).unwrap();
        config.set("Simulation_Type", "TYPHOID_SIM").unwrap();
        assert_eq!(config.get("Simulation_Type"), Some(&json!("TYPHOID_SIM")));
        assert!(matches!(
            config.set("Simulation_Typ", "TYPHOID_SIM"),
            Err(SchemaError::UnknownParameter { .. })
        ));
        assert!(matches!(
            config.set("Base_Individual_Sample_Rate", 2.0),
            Err(SchemaError::OutOfRange { .. })
        ));
    }

    #[test]
    fn finalize_drops_unmet_dependencies_transitively() {
        let mut config = Config::from_schema(test_schema()).unwrap();
        config.set("Enable_Vital_Dynamics", 0).unwrap();
        let dropped = config.finalize();
        assert!(dropped.contains(&"Enable_Birth".to_string()));
        assert!(dropped.contains(&"Birth_Rate_Dependence".to_string()));
        assert!(dropped.contains(&"Enable_Natural_Mortality".to_string()));
        assert!(dropped.contains(&"Death_Rate_Dependence".to_string()));
        assert!(config.get("Birth_Rate_Dependence").is_none());
    }

    #[test]
    fn finalize_honors_string_alternatives() {
        let mut config = Config::from_schema(test_schema()).unwrap();
        config.finalize();
        assert!(config.get("Typhoid_Carrier_Probability").is_none());

        let mut config = Config::from_schema(test_schema()).unwrap();
        config.set("Simulation_Type", "TYPHOID_SIM").unwrap();
        config.finalize();
        assert_eq!(config.get("Typhoid_Carrier_Probability"), Some(&json!(0.1)));
    }

    #[test]
    fn implicits_enable_vital_dynamics() {
        let mut config = Config::from_schema(test_schema()).unwrap();
        config.apply(&Implicit::PopulationDependentBirthRate).unwrap();
        config.apply(&Implicit::MortalityByAgeAndGender).unwrap();
        config.finalize();
        assert_eq!(
            config.get("Birth_Rate_Dependence"),
            Some(&json!("POPULATION_DEP_RATE"))
        );
        assert_eq!(
            config.get("Death_Rate_Dependence"),
            Some(&json!("NONDISEASE_MORTALITY_BY_AGE_AND_GENDER"))
        );
    }

    #[test]
    fn custom_events_are_merged_once() {
        let mut config = Config::from_schema(test_schema()).unwrap();
        config
            .add_custom_events(&["Cleared".to_string(), "Vaccinated".to_string()])
            .unwrap();
        config.add_custom_events(&["Cleared".to_string()]).unwrap();
        assert_eq!(
            config.get("Custom_Individual_Events"),
            Some(&json!(["Cleared", "Vaccinated"]))
        );
    }

    #[test]
    fn save_wraps_parameters() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let config = Config::from_schema(test_schema()).unwrap();
        config.save(&path).unwrap();
        let contents: Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(contents["parameters"]["Run_Number"], json!(1));
    }
}
