//! Demographics input (`demographics.json`).
//!
//! A demographics file describes the nodes of a simulation (location, initial population) and
//! the vital dynamics of the people in them. Setting a birth or mortality rate also implies config
//! changes, which are collected as [`Implicit`]s for the task to apply.
use crate::config::Implicit;
use crate::error::TyphoidError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};

const DAYS_PER_YEAR: f64 = 365.0;
const COUNTRY_COLUMN: &str = "Country Name";
const DEFAULT_ID_REFERENCE: &str = "Gridded world grump2.5arcmin";

/// A rate per 1000 people per year, the unit World Bank indicators use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrudeRate(pub f64);

impl CrudeRate {
    /// The same rate per person per day, the unit the model uses.
    pub fn dtk_rate(self) -> f64 {
        self.0 / DAYS_PER_YEAR / 1000.0
    }
}

/// Crude birth rates by country and year, read from a World Bank indicator CSV.
#[derive(Debug, Default)]
pub struct WorldBankTable {
    rates: HashMap<String, HashMap<u16, f64>>,
}

impl WorldBankTable {
    /// # Errors
    /// Returns an error if the file cannot be read or has no `Country Name` header row.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TyphoidError> {
        debug!("reading world bank data from {}", path.as_ref().display());
        Self::from_reader(File::open(path)?)
    }

    /// Reads the CSV, skipping any preamble rows before the `Country Name` header. Year columns
    /// are the headers that parse as a year; empty cells are treated as missing data.
    ///
    /// # Errors
    /// Returns an error if the CSV is malformed or has no `Country Name` header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TyphoidError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut header: Option<Vec<String>> = None;
        let mut table = WorldBankTable::default();
        for record in reader.records() {
            let record = record?;
            let Some(columns) = &header else {
                if record.get(0).map(str::trim) == Some(COUNTRY_COLUMN) {
                    header = Some(record.iter().map(|c| c.trim().to_string()).collect());
                }
                continue;
            };
            let Some(country) = record.get(0).map(str::trim).filter(|c| !c.is_empty()) else {
                continue;
            };
            let by_year = table.rates.entry(country.to_string()).or_default();
            for (column, cell) in columns.iter().zip(record.iter()) {
                let (Ok(year), Ok(rate)) = (column.parse::<u16>(), cell.trim().parse::<f64>())
                else {
                    continue;
                };
                by_year.insert(year, rate);
            }
        }

        if header.is_none() {
            return Err(TyphoidError::DemographicsError(format!(
                "no '{COUNTRY_COLUMN}' header row in world bank data"
            )));
        }
        Ok(table)
    }

    /// # Errors
    /// Returns `DemographicsError` if the table has no value for `country` in `year`.
    pub fn crude_birth_rate(&self, country: &str, year: u16) -> Result<CrudeRate, TyphoidError> {
        let by_year = self.rates.get(country).ok_or_else(|| {
            TyphoidError::DemographicsError(format!("country {country} not in world bank data"))
        })?;
        by_year.get(&year).copied().map(CrudeRate).ok_or_else(|| {
            TyphoidError::DemographicsError(format!(
                "no world bank value for {country} in {year}"
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgeGenderDistribution {
    pub num_distribution_axes: u32,
    pub axis_names: Vec<String>,
    pub axis_units: Vec<String>,
    pub axis_scale_factors: Vec<f64>,
    pub num_population_groups: Vec<u32>,
    pub population_groups: Vec<Vec<f64>>,
    pub result_scale_factor: f64,
    pub result_units: String,
    pub result_values: Vec<Vec<f64>>,
}

impl AgeGenderDistribution {
    /// The same daily rate for both genders at every age.
    pub fn constant(rate: f64) -> Self {
        AgeGenderDistribution {
            num_distribution_axes: 2,
            axis_names: vec!["gender".to_string(), "age".to_string()],
            axis_units: vec!["male=0,female=1".to_string(), "years".to_string()],
            axis_scale_factors: vec![1.0, DAYS_PER_YEAR],
            num_population_groups: vec![2, 2],
            population_groups: vec![vec![0.0, 1.0], vec![0.0, 100.0]],
            result_scale_factor: 1.0,
            result_units: "daily deaths per capita".to_string(),
            result_values: vec![vec![rate, rate], vec![rate, rate]],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndividualAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mortality_distribution: Option<AgeGenderDistribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeAttributes {
    pub latitude: f64,
    pub longitude: f64,
    pub initial_population: u32,
    pub facility_name: String,
    /// Births per person per day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "NodeID")]
    pub node_id: u32,
    #[serde(rename = "NodeAttributes")]
    pub node_attributes: NodeAttributes,
    #[serde(rename = "IndividualAttributes", default)]
    pub individual_attributes: IndividualAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
    pub id_reference: String,
    pub node_count: usize,
    pub tool: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Defaults {
    pub individual_attributes: IndividualAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DemographicsFile {
    pub metadata: Metadata,
    pub defaults: Defaults,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
pub struct Demographics {
    nodes: Vec<Node>,
    defaults: Defaults,
    id_reference: String,
    implicits: Vec<Implicit>,
}

impl Demographics {
    /// A single-node demographics file.
    pub fn from_template_node(
        lat: f64,
        lon: f64,
        pop: u32,
        name: impl Into<String>,
        forced_id: u32,
    ) -> Self {
        let node = Node {
            node_id: forced_id,
            node_attributes: NodeAttributes {
                latitude: lat,
                longitude: lon,
                initial_population: pop,
                facility_name: name.into(),
                birth_rate: None,
            },
            individual_attributes: IndividualAttributes::default(),
        };
        debug!("template node {forced_id} with population {pop}");
        Demographics {
            nodes: vec![node],
            defaults: Defaults::default(),
            id_reference: DEFAULT_ID_REFERENCE.to_string(),
            implicits: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Config changes implied by the vital dynamics set so far.
    pub fn implicits(&self) -> &[Implicit] {
        &self.implicits
    }

    fn add_implicit(&mut self, implicit: Implicit) {
        if !self.implicits.contains(&implicit) {
            self.implicits.push(implicit);
        }
    }

    fn selected_nodes<'a>(
        &'a mut self,
        node_ids: Option<&'a [u32]>,
    ) -> Result<Vec<&'a mut Node>, TyphoidError> {
        if let Some(ids) = node_ids {
            if let Some(missing) = ids
                .iter()
                .find(|id| !self.nodes.iter().any(|node| node.node_id == **id))
            {
                return Err(TyphoidError::DemographicsError(format!(
                    "node {missing} not in demographics"
                )));
            }
        }
        Ok(self
            .nodes
            .iter_mut()
            .filter(|node| node_ids.is_none_or(|ids| ids.contains(&node.node_id)))
            .collect())
    }

    /// Sets a population-dependent birth rate on the given nodes (all nodes when `None`).
    ///
    /// # Errors
    /// Returns `DemographicsError` if a listed node does not exist.
    pub fn set_birth_rate(
        &mut self,
        rate: CrudeRate,
        node_ids: Option<&[u32]>,
    ) -> Result<(), TyphoidError> {
        let daily = rate.dtk_rate();
        for node in self.selected_nodes(node_ids)? {
            node.node_attributes.birth_rate = Some(daily);
        }
        self.add_implicit(Implicit::PopulationDependentBirthRate);
        Ok(())
    }

    /// Sets a constant mortality rate for every age and gender. With `node_ids` of `None` the
    /// rate goes into the defaults shared by all nodes.
    ///
    /// # Errors
    /// Returns `DemographicsError` if a listed node does not exist.
    pub fn set_mortality_rate(
        &mut self,
        rate: CrudeRate,
        node_ids: Option<&[u32]>,
    ) -> Result<(), TyphoidError> {
        let distribution = AgeGenderDistribution::constant(rate.dtk_rate());
        if node_ids.is_none() {
            self.defaults.individual_attributes.mortality_distribution = Some(distribution);
        } else {
            for node in self.selected_nodes(node_ids)? {
                node.individual_attributes.mortality_distribution = Some(distribution.clone());
            }
        }
        self.add_implicit(Implicit::MortalityByAgeAndGender);
        Ok(())
    }

    /// Equal birth and mortality rates, so the population stays roughly constant.
    ///
    /// # Errors
    /// Returns `DemographicsError` if a listed node does not exist.
    pub fn set_equilibrium_vital_dynamics(
        &mut self,
        crude_birth_rate: CrudeRate,
        node_ids: Option<&[u32]>,
    ) -> Result<(), TyphoidError> {
        self.set_birth_rate(crude_birth_rate, node_ids)?;
        self.set_mortality_rate(crude_birth_rate, node_ids)
    }

    /// Equilibrium vital dynamics at the crude birth rate of `country` in `year`.
    ///
    /// # Errors
    /// Returns `DemographicsError` if the table has no value for `country` in `year`.
    pub fn set_equilibrium_vital_dynamics_from_world_bank(
        &mut self,
        table: &WorldBankTable,
        country: &str,
        year: u16,
    ) -> Result<(), TyphoidError> {
        let rate = table.crude_birth_rate(country, year)?;
        info!("{country} {year} crude birth rate is {}", rate.0);
        self.set_equilibrium_vital_dynamics(rate, None)
    }

    pub fn to_file_contents(&self) -> DemographicsFile {
        DemographicsFile {
            metadata: Metadata {
                id_reference: self.id_reference.clone(),
                node_count: self.nodes.len(),
                tool: env!("CARGO_PKG_NAME").to_string(),
            },
            defaults: self.defaults.clone(),
            nodes: self.nodes.clone(),
        }
    }

    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf, TyphoidError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.to_file_contents())?;
        info!("wrote demographics to {}", path.display());
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use tempfile::tempdir;

    const WORLD_BANK: &str =
        concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/world_bank_births.csv");

    #[test]
    fn crude_rate_converts_to_daily_per_person() {
        assert_approx_eq!(CrudeRate(36.5).dtk_rate(), 0.0001);
    }

    #[test]
    fn world_bank_lookup() {
        let table = WorldBankTable::from_path(WORLD_BANK).unwrap();
        assert_eq!(table.crude_birth_rate("Chile", 2005).unwrap(), CrudeRate(14.9));
        assert!(matches!(
            table.crude_birth_rate("Atlantis", 2005),
            Err(TyphoidError::DemographicsError(_))
        ));
        // Kenya has an empty cell for 2006.
        assert!(table.crude_birth_rate("Kenya", 2006).is_err());
        assert!(table.crude_birth_rate("Chile", 1990).is_err());
    }

    #[test]
    fn world_bank_preamble_is_skipped() {
        let data = "\"Data Source\",\"World Development Indicators\",\n\n\
                    Country Name,Country Code,2005\n\
                    Chile,CHL,14.9\n";
        let table = WorldBankTable::from_reader(data.as_bytes()).unwrap();
        assert_eq!(table.crude_birth_rate("Chile", 2005).unwrap(), CrudeRate(14.9));
    }

    #[test]
    fn world_bank_without_header_is_an_error() {
        let data = "Chile,CHL,14.9\n";
        assert!(WorldBankTable::from_reader(data.as_bytes()).is_err());
    }

    #[test]
    fn equilibrium_sets_births_and_deaths() {
        let table = WorldBankTable::from_path(WORLD_BANK).unwrap();
        let mut demog = Demographics::from_template_node(0.0, 0.0, 10000, "1", 1);
        demog
            .set_equilibrium_vital_dynamics_from_world_bank(&table, "Chile", 2005)
            .unwrap();

        let expected = 14.9 / 365.0 / 1000.0;
        let birth_rate = demog.nodes()[0].node_attributes.birth_rate.unwrap();
        assert_approx_eq!(birth_rate, expected);
        let mortality = demog
            .defaults()
            .individual_attributes
            .mortality_distribution
            .as_ref()
            .unwrap();
        assert_approx_eq!(mortality.result_values[1][0], expected);
        assert_eq!(
            demog.implicits(),
            &[
                Implicit::PopulationDependentBirthRate,
                Implicit::MortalityByAgeAndGender
            ]
        );
    }

    #[test]
    fn unknown_node_is_rejected() {
        let mut demog = Demographics::from_template_node(0.0, 0.0, 100, "1", 1);
        assert!(demog.set_birth_rate(CrudeRate(10.0), Some(&[2])).is_err());
        demog.set_mortality_rate(CrudeRate(10.0), Some(&[1])).unwrap();
        assert!(demog.nodes()[0]
            .individual_attributes
            .mortality_distribution
            .is_some());
    }

    #[test]
    fn save_uses_emod_layout() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("demographics.json");
        let demog = Demographics::from_template_node(1.5, -2.0, 500, "home", 7);
        demog.save(&path).unwrap();

        let contents: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(contents["Metadata"]["NodeCount"], 1);
        let node = &contents["Nodes"][0];
        assert_eq!(node["NodeID"], 7);
        assert_eq!(node["NodeAttributes"]["InitialPopulation"], 500);
        assert_eq!(node["NodeAttributes"]["Latitude"], 1.5);
        assert!(node["NodeAttributes"].get("BirthRate").is_none());

        let round_trip: DemographicsFile =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(round_trip.nodes, demog.nodes());
    }
}
