pub use crate::campaign::Campaign;
pub use crate::config::{Config, Implicit};
pub use crate::demographics::{CrudeRate, Demographics, WorldBankTable};
pub use crate::error::{SchemaError, TyphoidError};
pub use crate::experiment::Experiment;
pub use crate::interventions::carrier_clear;
pub use crate::interventions::common::{ScheduledEvent, TargetGender, Targeting, TriggeredEvent};
pub use crate::interventions::outbreak;
pub use crate::log::{debug, error, info, trace, warn};
pub use crate::manifest::Manifest;
pub use crate::platform::{LocalPlatform, Platform};
pub use crate::schema::{Schema, SchemaObject};
pub use crate::sweep::{Simulation, SimulationBuilder, SimulationStatus, Tags};
pub use crate::task::{AssetCollection, EmodTask, TaskSpec};
