//! `TyphoidCarrierClear`: clears the chronic carrier state of the individuals it reaches at the
//! configured `Clearance_Rate`.
use super::common::{
    scheduled_campaign_event, triggered_campaign_event, ScheduledEvent, Targeting, TriggeredEvent,
};
use crate::campaign::Campaign;
use crate::error::TyphoidError;
use crate::schema::SchemaObject;
use log::info;
use std::path::{Path, PathBuf};

pub const CLASS_NAME: &str = "TyphoidCarrierClear";
pub const DEFAULT_FILENAME: &str = "TyphoidCarrierClear.json";
pub const TRIGGERED_EVENT_NAME: &str = "Triggered Typhoid Vax";
/// Rate used by [`new_intervention_as_file`].
pub const FILE_CLEARANCE_RATE: f64 = 0.567;

/// Distribution options for [`new_triggered_intervention`].
#[derive(Debug, Clone)]
pub struct TriggeredOptions {
    pub start_day: f64,
    pub triggers: Vec<String>,
    pub coverage: f64,
    /// `None` distributes in every node.
    pub node_ids: Option<Vec<u32>>,
    /// `Key:Value` individual property restrictions.
    pub property_restrictions: Vec<String>,
    /// Reserved for a companion event; currently ignored.
    pub co_event: Option<String>,
}

impl Default for TriggeredOptions {
    fn default() -> Self {
        TriggeredOptions {
            start_day: 1.0,
            triggers: vec!["Births".to_string()],
            coverage: 1.0,
            node_ids: None,
            property_restrictions: Vec::new(),
            co_event: None,
        }
    }
}

/// Distribution options for [`new_scheduled_intervention`].
#[derive(Debug, Clone)]
pub struct ScheduledOptions {
    pub start_day: f64,
    pub coverage: f64,
    pub node_ids: Option<Vec<u32>>,
    pub property_restrictions: Vec<String>,
    /// Reserved for a companion event; currently ignored.
    pub co_event: Option<String>,
}

impl Default for ScheduledOptions {
    fn default() -> Self {
        ScheduledOptions {
            start_day: 1.0,
            coverage: 1.0,
            node_ids: None,
            property_restrictions: Vec::new(),
            co_event: None,
        }
    }
}

/// A bare `TyphoidCarrierClear` intervention with `Clearance_Rate` set to `rate`.
///
/// # Errors
/// Returns an error if the schema has no `TyphoidCarrierClear` class or rejects `rate`.
pub fn new_intervention(camp: &Campaign, rate: f64) -> Result<SchemaObject, TyphoidError> {
    let mut intervention = camp.class_with_defaults(CLASS_NAME)?;
    intervention.set("Clearance_Rate", rate)?;
    Ok(intervention)
}

/// Distributes `TyphoidCarrierClear` whenever one of `opts.triggers` is published by the model or
/// by another campaign event.
///
/// # Errors
/// Returns an error if the intervention or its event cannot be built.
pub fn new_triggered_intervention(
    camp: &mut Campaign,
    rate: f64,
    opts: &TriggeredOptions,
) -> Result<SchemaObject, TyphoidError> {
    let intervention = new_intervention(camp, rate)?;
    let event = TriggeredEvent {
        start_day: opts.start_day,
        event_name: Some(TRIGGERED_EVENT_NAME.to_string()),
        node_ids: opts.node_ids.clone(),
        triggers: opts.triggers.clone(),
        property_restrictions: opts.property_restrictions.clone(),
        targeting: Targeting {
            demographic_coverage: opts.coverage,
            ..Targeting::default()
        },
        ..TriggeredEvent::default()
    };
    triggered_campaign_event(camp, &event, vec![intervention])
}

/// Distributes `TyphoidCarrierClear` once, on `opts.start_day`.
///
/// # Errors
/// Returns an error if the intervention or its event cannot be built.
pub fn new_scheduled_intervention(
    camp: &mut Campaign,
    rate: f64,
    opts: &ScheduledOptions,
) -> Result<SchemaObject, TyphoidError> {
    let intervention = new_intervention(camp, rate)?;
    let event = ScheduledEvent {
        start_day: opts.start_day,
        node_ids: opts.node_ids.clone(),
        property_restrictions: opts.property_restrictions.clone(),
        targeting: Targeting {
            demographic_coverage: opts.coverage,
            ..Targeting::default()
        },
        ..ScheduledEvent::default()
    };
    scheduled_campaign_event(camp, &event, vec![intervention])
}

/// Puts a birth-triggered `TyphoidCarrierClear` event at the front of `camp` and saves the
/// campaign to `filename` (`TyphoidCarrierClear.json` when `None`). Returns the path written.
///
/// # Errors
/// Returns an error if the event cannot be built or the file cannot be written.
pub fn new_intervention_as_file(
    camp: &mut Campaign,
    start_day: f64,
    filename: Option<&Path>,
) -> Result<PathBuf, TyphoidError> {
    let opts = TriggeredOptions {
        start_day,
        ..TriggeredOptions::default()
    };
    let event = new_triggered_intervention(camp, FILE_CLEARANCE_RATE, &opts)?;
    camp.add(event, true);
    let filename = filename.unwrap_or_else(|| Path::new(DEFAULT_FILENAME));
    let written = camp.save(filename)?;
    info!("{CLASS_NAME} campaign written to {}", written.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::test_support::test_schema;
    use serde_json::{json, Value};
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn intervention_carries_clearance_rate() {
        let camp = Campaign::new(test_schema());
        let iv = new_intervention(&camp, 0.3).unwrap();
        assert_eq!(iv.class(), CLASS_NAME);
        assert_eq!(iv.get("Clearance_Rate"), Some(&json!(0.3)));
    }

    #[test]
    fn invalid_rate_is_rejected() {
        let camp = Campaign::new(test_schema());
        assert!(new_intervention(&camp, -0.1).is_err());
    }

    #[test]
    fn triggered_defaults_listen_for_births_at_full_coverage() {
        let mut camp = Campaign::new(test_schema());
        let event = new_triggered_intervention(&mut camp, 0.5, &TriggeredOptions::default())
            .unwrap()
            .into_json();
        assert_eq!(event["Event_Name"], json!(TRIGGERED_EVENT_NAME));
        assert_eq!(event["Start_Day"], json!(1.0));
        let listener = &event["Event_Coordinator_Config"]["Intervention_Config"];
        assert_eq!(listener["Trigger_Condition_List"], json!(["Births"]));
        assert_eq!(listener["Demographic_Coverage"], json!(1.0));
        assert_eq!(
            listener["Actual_IndividualIntervention_Config"]["Clearance_Rate"],
            json!(0.5)
        );
        assert!(camp.custom_events().is_empty());
    }

    #[test]
    fn triggered_options_are_applied() {
        let mut camp = Campaign::new(test_schema());
        let opts = TriggeredOptions {
            start_day: 10.0,
            triggers: vec!["NewInfectionEvent".to_string()],
            coverage: 0.4,
            node_ids: Some(vec![1, 2]),
            property_restrictions: vec!["Place:Urban".to_string()],
            co_event: Some("ignored".to_string()),
        };
        let event = new_triggered_intervention(&mut camp, 0.5, &opts)
            .unwrap()
            .into_json();
        assert_eq!(event["Start_Day"], json!(10.0));
        assert_eq!(event["Nodeset_Config"]["Node_List"], json!([1, 2]));
        let listener = &event["Event_Coordinator_Config"]["Intervention_Config"];
        assert_eq!(listener["Demographic_Coverage"], json!(0.4));
        assert_eq!(
            listener["Property_Restrictions_Within_Node"],
            json!([{"Place": "Urban"}])
        );
    }

    #[test]
    fn scheduled_event_has_no_trigger_list() {
        let mut camp = Campaign::new(test_schema());
        let event = new_scheduled_intervention(&mut camp, 0.5, &ScheduledOptions::default())
            .unwrap()
            .into_json();
        let coordinator = &event["Event_Coordinator_Config"];
        assert_eq!(coordinator["Demographic_Coverage"], json!(1.0));
        assert_eq!(coordinator["Intervention_Config"]["class"], json!(CLASS_NAME));
        assert!(coordinator["Intervention_Config"]
            .get("Trigger_Condition_List")
            .is_none());
    }

    #[test]
    fn as_file_writes_named_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("tcc.json");
        let mut camp = Campaign::new(test_schema());
        camp.add(json!({"class": "CampaignEvent"}), false);
        let written = new_intervention_as_file(&mut camp, 5.0, Some(&path)).unwrap();
        assert_eq!(written, path);

        let contents: Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        let events = contents["Events"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["Start_Day"], json!(5.0));
        assert_eq!(
            events[0]["Event_Coordinator_Config"]["Intervention_Config"]
                ["Actual_IndividualIntervention_Config"]["Clearance_Rate"],
            json!(FILE_CLEARANCE_RATE)
        );
    }
}
