//! Seeding infections.
use super::common::{scheduled_campaign_event, ScheduledEvent, Targeting};
use crate::campaign::Campaign;
use crate::error::TyphoidError;
use crate::schema::SchemaObject;

/// An event that infects individuals on day `timestep`. With one case the whole population is
/// targeted; any other count infects exactly `cases` individuals.
///
/// # Errors
/// Returns an error if the schema has no `OutbreakIndividual` class or rejects the values.
pub fn new_intervention(
    camp: &mut Campaign,
    timestep: f64,
    cases: u32,
) -> Result<SchemaObject, TyphoidError> {
    let outbreak = camp.class_with_defaults("OutbreakIndividual")?;
    let opts = ScheduledEvent {
        start_day: timestep,
        target_num_individuals: (cases != 1).then_some(cases),
        ..ScheduledEvent::default()
    };
    scheduled_campaign_event(camp, &opts, vec![outbreak])
}

/// An event that infects a `coverage` fraction of individuals on day `timestep`, optionally
/// restricted to `node_ids`.
///
/// # Errors
/// Returns an error if the schema has no `OutbreakIndividual` class or rejects the values.
pub fn seed_by_coverage(
    camp: &mut Campaign,
    timestep: f64,
    coverage: f64,
    node_ids: Option<Vec<u32>>,
) -> Result<SchemaObject, TyphoidError> {
    let outbreak = camp.class_with_defaults("OutbreakIndividual")?;
    let opts = ScheduledEvent {
        start_day: timestep,
        node_ids,
        targeting: Targeting {
            demographic_coverage: coverage,
            ..Targeting::default()
        },
        ..ScheduledEvent::default()
    };
    scheduled_campaign_event(camp, &opts, vec![outbreak])
}
