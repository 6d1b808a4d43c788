//! Campaign event wrappers shared by all interventions.
//!
//! Both wrappers produce a `CampaignEvent` whose coordinator is a
//! `StandardInterventionDistributionEventCoordinator`. A scheduled event hands its interventions
//! to individuals on `Start_Day`; a triggered event instead installs a
//! `NodeLevelHealthTriggeredIV` that hands them out whenever one of its triggers is published.
use super::utils::{do_nodes, property_restrictions, property_restrictions_within_node};
use crate::campaign::Campaign;
use crate::error::TyphoidError;
use crate::schema::SchemaObject;
use log::debug;
use serde_json::Value;
use strum::{Display, EnumString};

const DEFAULT_TARGET_AGE_MAX: f64 = 125.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
pub enum TargetGender {
    #[default]
    All,
    Male,
    Female,
}

/// Who an event is distributed to, beyond its property restrictions.
#[derive(Debug, Clone, PartialEq)]
pub struct Targeting {
    pub demographic_coverage: f64,
    /// Ages in years.
    pub target_age_min: f64,
    pub target_age_max: f64,
    pub target_gender: TargetGender,
}

impl Default for Targeting {
    fn default() -> Self {
        Targeting {
            demographic_coverage: 1.0,
            target_age_min: 0.0,
            target_age_max: DEFAULT_TARGET_AGE_MAX,
            target_gender: TargetGender::All,
        }
    }
}

impl Targeting {
    fn target_demographic(&self) -> &'static str {
        let explicit_ages =
            self.target_age_min > 0.0 || self.target_age_max < DEFAULT_TARGET_AGE_MAX;
        match (explicit_ages, self.target_gender) {
            (false, TargetGender::All) => "Everyone",
            (true, TargetGender::All) => "ExplicitAgeRanges",
            (false, _) => "ExplicitGender",
            (true, _) => "ExplicitAgeRangesAndGender",
        }
    }

    fn apply(&self, target: &mut SchemaObject) -> Result<(), TyphoidError> {
        target.set("Demographic_Coverage", self.demographic_coverage)?;
        target.set("Target_Demographic", self.target_demographic())?;
        if self.target_demographic() != "Everyone" {
            target.set("Target_Age_Min", self.target_age_min)?;
            target.set("Target_Age_Max", self.target_age_max)?;
            target.set("Target_Gender", self.target_gender.to_string())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub start_day: f64,
    pub event_name: Option<String>,
    /// `None` distributes to every node.
    pub node_ids: Option<Vec<u32>>,
    pub number_repetitions: i32,
    pub timesteps_between_repetitions: i32,
    /// `Key:Value` individual property restrictions.
    pub property_restrictions: Vec<String>,
    pub targeting: Targeting,
    /// Distribute to a fixed number of individuals instead of a coverage fraction.
    pub target_num_individuals: Option<u32>,
    pub target_residents_only: bool,
}

impl Default for ScheduledEvent {
    fn default() -> Self {
        ScheduledEvent {
            start_day: 1.0,
            event_name: None,
            node_ids: None,
            number_repetitions: 1,
            timesteps_between_repetitions: -1,
            property_restrictions: Vec::new(),
            targeting: Targeting::default(),
            target_num_individuals: None,
            target_residents_only: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriggeredEvent {
    pub start_day: f64,
    pub event_name: Option<String>,
    pub node_ids: Option<Vec<u32>>,
    pub triggers: Vec<String>,
    /// Days the listener stays active; -1 keeps it forever.
    pub duration: f64,
    /// `Key:Value` individual property restrictions.
    pub property_restrictions: Vec<String>,
    pub targeting: Targeting,
}

impl Default for TriggeredEvent {
    fn default() -> Self {
        TriggeredEvent {
            start_day: 1.0,
            event_name: None,
            node_ids: None,
            triggers: Vec::new(),
            duration: -1.0,
            property_restrictions: Vec::new(),
            targeting: Targeting::default(),
        }
    }
}

/// A single intervention is used as is; several are bundled in a `MultiInterventionDistributor`.
fn bundle_interventions(
    camp: &Campaign,
    mut interventions: Vec<SchemaObject>,
) -> Result<Value, TyphoidError> {
    match interventions.len() {
        0 => Err(TyphoidError::TyphoidError(
            "an event needs at least one intervention".to_string(),
        )),
        1 => Ok(interventions.remove(0).into_json()),
        _ => {
            let mut distributor = camp.class_with_defaults("MultiInterventionDistributor")?;
            let list: Vec<Value> = interventions.into_iter().map(Value::from).collect();
            distributor.set("Intervention_List", list)?;
            Ok(distributor.into_json())
        }
    }
}

fn campaign_event(
    camp: &Campaign,
    start_day: f64,
    event_name: Option<&str>,
    node_ids: Option<&[u32]>,
    coordinator: SchemaObject,
) -> Result<SchemaObject, TyphoidError> {
    let mut event = camp.class_with_defaults("CampaignEvent")?;
    event.set("Start_Day", start_day)?;
    if let Some(name) = event_name {
        event.set("Event_Name", name)?;
    }
    event.set("Nodeset_Config", do_nodes(camp.schema(), node_ids)?)?;
    event.set("Event_Coordinator_Config", coordinator)?;
    Ok(event)
}

/// Wraps `interventions` in an event that distributes them on `opts.start_day`.
///
/// # Errors
/// Returns an error if `interventions` is empty, a property restriction is malformed, or the
/// schema rejects any of the values.
pub fn scheduled_campaign_event(
    camp: &mut Campaign,
    opts: &ScheduledEvent,
    interventions: Vec<SchemaObject>,
) -> Result<SchemaObject, TyphoidError> {
    let mut coordinator =
        camp.class_with_defaults("StandardInterventionDistributionEventCoordinator")?;
    opts.targeting.apply(&mut coordinator)?;
    if let Some(count) = opts.target_num_individuals {
        coordinator.set("Individual_Selection_Type", "TARGET_NUM_INDIVIDUALS")?;
        coordinator.set("Target_Num_Individuals", count)?;
    }
    coordinator.set("Number_Repetitions", opts.number_repetitions)?;
    coordinator.set(
        "Timesteps_Between_Repetitions",
        opts.timesteps_between_repetitions,
    )?;
    coordinator.set(
        "Property_Restrictions",
        property_restrictions(&opts.property_restrictions)?,
    )?;
    coordinator.set("Target_Residents_Only", opts.target_residents_only)?;
    coordinator.set("Intervention_Config", bundle_interventions(camp, interventions)?)?;

    debug!("scheduled event at day {}", opts.start_day);
    campaign_event(
        camp,
        opts.start_day,
        opts.event_name.as_deref(),
        opts.node_ids.as_deref(),
        coordinator,
    )
}

/// Wraps `interventions` in an event that distributes them whenever one of `opts.triggers` is
/// published, starting on `opts.start_day`.
///
/// # Errors
/// Returns an error if `interventions` is empty, a property restriction is malformed, or the
/// schema rejects any of the values.
pub fn triggered_campaign_event(
    camp: &mut Campaign,
    opts: &TriggeredEvent,
    interventions: Vec<SchemaObject>,
) -> Result<SchemaObject, TyphoidError> {
    let triggers: Vec<Value> = opts
        .triggers
        .iter()
        .map(|trigger| Value::String(camp.get_recv_trigger(trigger)))
        .collect();

    let mut listener = camp.class_with_defaults("NodeLevelHealthTriggeredIV")?;
    listener.set("Trigger_Condition_List", triggers)?;
    opts.targeting.apply(&mut listener)?;
    listener.set("Duration", opts.duration)?;
    listener.set(
        "Property_Restrictions_Within_Node",
        property_restrictions_within_node(&opts.property_restrictions)?,
    )?;
    listener.set(
        "Actual_IndividualIntervention_Config",
        bundle_interventions(camp, interventions)?,
    )?;

    let mut coordinator =
        camp.class_with_defaults("StandardInterventionDistributionEventCoordinator")?;
    coordinator.set("Intervention_Config", listener)?;

    debug!(
        "triggered event at day {} on {:?}",
        opts.start_day, opts.triggers
    );
    campaign_event(
        camp,
        opts.start_day,
        opts.event_name.as_deref(),
        opts.node_ids.as_deref(),
        coordinator,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::test_support::test_schema;
    use serde_json::json;

    fn outbreak(camp: &Campaign) -> SchemaObject {
        camp.class_with_defaults("OutbreakIndividual").unwrap()
    }

    #[test]
    fn scheduled_event_has_coordinator_and_node_set() {
        let mut camp = Campaign::new(test_schema());
        let iv = outbreak(&camp);
        let opts = ScheduledEvent {
            start_day: 30.0,
            node_ids: Some(vec![2]),
            ..ScheduledEvent::default()
        };
        let event = scheduled_campaign_event(&mut camp, &opts, vec![iv]).unwrap();
        let event = event.to_json();
        assert_eq!(event["Start_Day"], json!(30.0));
        assert_eq!(event["Nodeset_Config"]["Node_List"], json!([2]));
        let coordinator = &event["Event_Coordinator_Config"];
        assert_eq!(
            coordinator["class"],
            json!("StandardInterventionDistributionEventCoordinator")
        );
        assert_eq!(coordinator["Demographic_Coverage"], json!(1.0));
        assert_eq!(coordinator["Target_Demographic"], json!("Everyone"));
        assert_eq!(
            coordinator["Intervention_Config"]["class"],
            json!("OutbreakIndividual")
        );
    }

    #[test]
    fn several_interventions_are_bundled() {
        let mut camp = Campaign::new(test_schema());
        let ivs = vec![outbreak(&camp), outbreak(&camp)];
        let event =
            scheduled_campaign_event(&mut camp, &ScheduledEvent::default(), ivs).unwrap();
        let event = event.to_json();
        let config = &event["Event_Coordinator_Config"]["Intervention_Config"];
        assert_eq!(config["class"], json!("MultiInterventionDistributor"));
        assert_eq!(config["Intervention_List"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn empty_intervention_list_is_an_error() {
        let mut camp = Campaign::new(test_schema());
        assert!(scheduled_campaign_event(&mut camp, &ScheduledEvent::default(), vec![]).is_err());
    }

    #[test]
    fn targeting_selects_target_demographic() {
        let mut camp = Campaign::new(test_schema());
        let iv = outbreak(&camp);
        let opts = ScheduledEvent {
            targeting: Targeting {
                target_age_min: 5.0,
                target_gender: TargetGender::Female,
                ..Targeting::default()
            },
            ..ScheduledEvent::default()
        };
        let event = scheduled_campaign_event(&mut camp, &opts, vec![iv]).unwrap();
        let event = event.to_json();
        let coordinator = &event["Event_Coordinator_Config"];
        assert_eq!(
            coordinator["Target_Demographic"],
            json!("ExplicitAgeRangesAndGender")
        );
        assert_eq!(coordinator["Target_Gender"], json!("Female"));
        assert_eq!(coordinator["Target_Age_Min"], json!(5.0));
    }

    #[test]
    fn triggered_event_registers_triggers() {
        let mut camp = Campaign::new(test_schema());
        let iv = outbreak(&camp);
        let opts = TriggeredEvent {
            triggers: vec!["Births".to_string(), "GotVaccinated".to_string()],
            property_restrictions: vec!["Risk:High".to_string()],
            event_name: Some("listener".to_string()),
            ..TriggeredEvent::default()
        };
        let event = triggered_campaign_event(&mut camp, &opts, vec![iv]).unwrap();
        let event = event.to_json();
        assert_eq!(event["Event_Name"], json!("listener"));
        assert_eq!(event["Nodeset_Config"]["class"], json!("NodeSetAll"));
        let listener = &event["Event_Coordinator_Config"]["Intervention_Config"];
        assert_eq!(listener["class"], json!("NodeLevelHealthTriggeredIV"));
        assert_eq!(
            listener["Trigger_Condition_List"],
            json!(["Births", "GotVaccinated"])
        );
        assert_eq!(
            listener["Property_Restrictions_Within_Node"],
            json!([{"Risk": "High"}])
        );
        assert_eq!(camp.custom_events(), vec!["GotVaccinated".to_string()]);
    }

    #[test]
    fn triggered_event_passes_empty_trigger_list_through() {
        let mut camp = Campaign::new(test_schema());
        let iv = outbreak(&camp);
        let event = triggered_campaign_event(&mut camp, &TriggeredEvent::default(), vec![iv])
            .unwrap()
            .into_json();
        let listener = &event["Event_Coordinator_Config"]["Intervention_Config"];
        assert_eq!(listener["Trigger_Condition_List"], json!([]));
        assert_eq!(camp.signals_received().count(), 0);
    }

    #[test]
    fn target_gender_round_trips_through_strings() {
        assert_eq!("Male".parse::<TargetGender>().unwrap(), TargetGender::Male);
        assert_eq!(TargetGender::All.to_string(), "All");
    }
}
