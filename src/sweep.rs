//! Parameter sweeps.
//!
//! A [`SimulationBuilder`] holds sweep definitions, each a callback and the values to call it
//! with. The simulations of an experiment are the cartesian product of all definitions: every
//! combination of one value per definition yields one simulation, whose config the callbacks
//! modify and whose tags they report.
use crate::config::Config;
use crate::error::TyphoidError;
use indexmap::IndexMap;
use serde_json::Value;
use std::rc::Rc;
use strum::Display;
use uuid::Uuid;

/// Labels describing what a sweep changed in a simulation.
pub type Tags = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SimulationStatus {
    Created,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Simulation {
    pub id: Uuid,
    pub config: Config,
    pub tags: Tags,
    pub status: SimulationStatus,
}

impl Simulation {
    pub fn new(config: Config) -> Self {
        Simulation {
            id: Uuid::new_v4(),
            config,
            tags: Tags::new(),
            status: SimulationStatus::Created,
        }
    }
}

type SweepStep = Box<dyn Fn(&mut Simulation) -> Result<Tags, TyphoidError>>;

#[derive(Default)]
pub struct SimulationBuilder {
    definitions: Vec<Vec<SweepStep>>,
}

impl SimulationBuilder {
    pub fn new() -> Self {
        SimulationBuilder::default()
    }

    /// Adds a sweep over `values`; `callback` is called once per simulation with that
    /// simulation's value. An empty `values` produces no simulations at all.
    pub fn add_sweep_definition<T, F, I>(&mut self, callback: F, values: I)
    where
        T: 'static,
        F: Fn(&mut Simulation, &T) -> Result<Tags, TyphoidError> + 'static,
        I: IntoIterator<Item = T>,
    {
        let callback = Rc::new(callback);
        let steps = values
            .into_iter()
            .map(|value| {
                let callback = Rc::clone(&callback);
                Box::new(move |sim: &mut Simulation| callback(sim, &value)) as SweepStep
            })
            .collect();
        self.definitions.push(steps);
    }

    /// Number of simulations the builder will produce.
    pub fn count(&self) -> usize {
        self.definitions.iter().map(Vec::len).product()
    }

    /// Creates one simulation per combination, starting from copies of `base`. The first
    /// definition varies slowest.
    ///
    /// # Errors
    /// Returns the first error raised by a callback.
    pub fn build(&self, base: &Config) -> Result<Vec<Simulation>, TyphoidError> {
        let mut simulations = Vec::with_capacity(self.count());
        let mut indices = vec![0usize; self.definitions.len()];
        if self.count() == 0 {
            return Ok(simulations);
        }
        loop {
            let mut sim = Simulation::new(base.clone());
            for (definition, &index) in self.definitions.iter().zip(&indices) {
                let tags = definition[index](&mut sim)?;
                sim.tags.extend(tags);
            }
            simulations.push(sim);

            // Advance the odometer from the last definition.
            let mut position = self.definitions.len();
            loop {
                if position == 0 {
                    return Ok(simulations);
                }
                position -= 1;
                indices[position] += 1;
                if indices[position] < self.definitions[position].len() {
                    break;
                }
                indices[position] = 0;
            }
        }
    }
}
