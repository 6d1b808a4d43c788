//! A campaign is the ordered list of events handed to the model as `campaign.json`.
//!
//! Besides the events, the campaign remembers every signal its events listen for or broadcast.
//! Signals that are not built into the model must be declared in the simulation config under
//! `Custom_Individual_Events`; [`Campaign::custom_events`] lists them.
use crate::error::TyphoidError;
use crate::schema::{Schema, SchemaObject};
use indexmap::IndexSet;
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Individual-level events the model publishes on its own.
pub const BUILT_IN_EVENTS: &[&str] = &[
    "Births",
    "DiseaseDeaths",
    "Emigrating",
    "EveryTimeStep",
    "EveryUpdate",
    "ExposureComplete",
    "HappyBirthday",
    "Immigrating",
    "NewClinicalCase",
    "NewInfectionEvent",
    "NewSevereCase",
    "NewlySymptomatic",
    "NoTrigger",
    "NonDiseaseDeaths",
    "OnDeath",
    "SymptomaticCleared",
];

#[derive(Serialize)]
struct CampaignFile<'a> {
    #[serde(rename = "Events")]
    events: &'a [Value],
    #[serde(rename = "Use_Defaults")]
    use_defaults: u8,
}

#[derive(Debug, Clone)]
pub struct Campaign {
    schema: Arc<Schema>,
    events: Vec<Value>,
    use_defaults: bool,
    signals_received: IndexSet<String>,
    signals_sent: IndexSet<String>,
}

impl Campaign {
    pub fn new(schema: Arc<Schema>) -> Self {
        Campaign {
            schema,
            events: Vec::new(),
            use_defaults: true,
            signals_received: IndexSet::new(),
            signals_sent: IndexSet::new(),
        }
    }

    /// Loads the schema at `path` and starts an empty campaign against it.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be loaded.
    pub fn with_schema_file(path: impl AsRef<Path>) -> Result<Self, TyphoidError> {
        info!("using {} as schema", path.as_ref().display());
        Ok(Campaign::new(Schema::load(path)?))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Creates an instance of `class` against this campaign's schema.
    ///
    /// # Errors
    /// Returns `SchemaError::UnknownClass` if the schema does not declare `class`.
    pub fn class_with_defaults(&self, class: &str) -> Result<SchemaObject, TyphoidError> {
        Ok(self.schema.class_with_defaults(class)?)
    }

    /// Appends `event`, or puts it at the front of the list when `first` is set.
    pub fn add(&mut self, event: impl Into<Value>, first: bool) {
        let event = event.into();
        if first {
            self.events.insert(0, event);
        } else {
            self.events.push(event);
        }
        debug!("campaign now holds {} events", self.events.len());
    }

    pub fn events(&self) -> &[Value] {
        &self.events
    }

    pub fn set_use_defaults(&mut self, use_defaults: bool) {
        self.use_defaults = use_defaults;
    }

    /// Drops all events and signal bookkeeping, keeping the schema.
    pub fn reset(&mut self) {
        self.events.clear();
        self.signals_received.clear();
        self.signals_sent.clear();
    }

    /// Registers `signal` as one that some event listens for and returns its name.
    pub fn get_recv_trigger(&mut self, signal: &str) -> String {
        self.signals_received.insert(signal.to_string());
        signal.to_string()
    }

    /// Registers `signal` as one that some event broadcasts and returns its name.
    pub fn get_send_trigger(&mut self, signal: &str) -> String {
        self.signals_sent.insert(signal.to_string());
        signal.to_string()
    }

    pub fn signals_received(&self) -> impl Iterator<Item = &str> {
        self.signals_received.iter().map(String::as_str)
    }

    pub fn signals_sent(&self) -> impl Iterator<Item = &str> {
        self.signals_sent.iter().map(String::as_str)
    }

    /// Signals used by this campaign that the model does not publish itself.
    pub fn custom_events(&self) -> Vec<String> {
        let mut custom: IndexSet<&String> = IndexSet::new();
        for signal in self.signals_sent.iter().chain(self.signals_received.iter()) {
            if !BUILT_IN_EVENTS.contains(&signal.as_str()) {
                custom.insert(signal);
            }
        }
        custom.into_iter().cloned().collect()
    }

    pub fn to_json(&self) -> Value {
        // Serializing a slice of `Value`s cannot fail.
        serde_json::to_value(self.file_contents()).unwrap_or(Value::Null)
    }

    fn file_contents(&self) -> CampaignFile<'_> {
        CampaignFile {
            events: &self.events,
            use_defaults: u8::from(self.use_defaults),
        }
    }

    /// Writes the campaign to `path` and returns the path written.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf, TyphoidError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.file_contents())?;
        info!(
            "wrote campaign with {} events to {}",
            self.events.len(),
            path.display()
        );
        Ok(path.to_path_buf())
    }
}
