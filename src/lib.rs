//! Authoring helpers for the EMOD typhoid model.
//!
//! The model reads three JSON inputs: a simulation config, a campaign and a demographics file.
//! This crate builds all three from the schema the model publishes, so every object it writes
//! carries the schema's defaults and every value it sets is checked against the schema:
//! * [`schema`] loads the schema and creates validated [`schema::SchemaObject`]s
//! * [`config`] holds the simulation parameters and drops the ones whose dependencies are unmet
//! * [`campaign`] collects campaign events, built by the helpers in [`interventions`]
//! * [`demographics`] builds single-node demographics with World Bank vital dynamics
//!
//! On top of the inputs, [`task`], [`sweep`], [`experiment`] and [`platform`] describe a set of
//! simulations and run them locally, and [`channel_reports`] summarises their output.
//! [`driver`] puts it all together in the "start here" workflow.
pub mod campaign;
pub mod channel_reports;
pub mod config;
pub mod demographics;
pub mod driver;
pub mod error;
pub mod experiment;
pub mod interventions;
pub mod log;
pub mod manifest;
pub mod platform;
pub mod prelude;
pub mod runner;
pub mod schema;
pub mod sweep;
pub mod task;

pub use crate::error::{SchemaError, TyphoidError};
