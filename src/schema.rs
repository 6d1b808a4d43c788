//! Schema-driven object construction.
//!
//! An EMOD schema is the JSON document produced by the model binary describing every class it
//! understands (under `idmTypes`) and every simulation parameter (under `config`). Each parameter
//! carries a `type`, usually a `default`, and optionally `min`/`max`, an `enum` list and a
//! `depends-on` condition.
//!
//! A [`SchemaObject`] is an instance of one class, created with every parameter at its schema
//! default. Assignments go through [`SchemaObject::set`], which rejects parameters the class does
//! not declare and values that violate the declared type or range.
//!
//! ```no_run
//! use emod_typhoid::schema::Schema;
//!
//! let schema = Schema::load("download/schema.json").unwrap();
//! let mut iv = schema.class_with_defaults("TyphoidCarrierClear").unwrap();
//! iv.set("Clearance_Rate", 0.5).unwrap();
//! ```
use crate::error::{SchemaError, TyphoidError};
use log::{debug, trace};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CLASS_KEY: &str = "class";
const SIM_TYPES_KEY: &str = "Sim_Types";
// Guards against self-referencing concrete types.
const MAX_NESTING_DEPTH: usize = 16;

/// A loaded EMOD schema document.
#[derive(Debug)]
pub struct Schema {
    document: Map<String, Value>,
    idm_types: Map<String, Value>,
    path: Option<PathBuf>,
}

impl Schema {
    /// Reads and parses the schema at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not JSON, or has no `idmTypes` section.
    pub fn load(path: impl AsRef<Path>) -> Result<Arc<Schema>, TyphoidError> {
        let path = path.as_ref();
        debug!("loading schema from {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        let value: Value = serde_json::from_reader(reader)?;
        let mut schema = Schema::parse(value)?;
        schema.path = Some(path.to_path_buf());
        Ok(Arc::new(schema))
    }

    /// Builds a schema from an in-memory JSON document.
    ///
    /// # Errors
    /// Returns an error if the document is not an object with an `idmTypes` section.
    pub fn from_json(value: Value) -> Result<Arc<Schema>, TyphoidError> {
        Ok(Arc::new(Schema::parse(value)?))
    }

    fn parse(value: Value) -> Result<Schema, SchemaError> {
        let Value::Object(mut document) = value else {
            return Err(SchemaError::Malformed(
                "schema root must be an object".to_string(),
            ));
        };
        let Some(Value::Object(idm_types)) = document.remove("idmTypes") else {
            return Err(SchemaError::Malformed(
                "missing idmTypes section".to_string(),
            ));
        };
        Ok(Schema {
            document,
            idm_types,
            path: None,
        })
    }

    /// The file this schema was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Finds the definition of `class`, either as a concrete `idmType:*` entry or as a member of
    /// one of the type groups.
    fn class_definition(&self, class: &str) -> Option<&Map<String, Value>> {
        let idm_types = &self.idm_types;
        if let Some(definition) = idm_types.get(class).and_then(Value::as_object) {
            if !class.starts_with("idmAbstractType:") {
                return Some(definition);
            }
        }
        idm_types
            .values()
            .filter_map(Value::as_object)
            .find_map(|group| {
                group
                    .get(class)
                    .and_then(Value::as_object)
                    .filter(|definition| definition.contains_key(CLASS_KEY))
            })
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_definition(class).is_some()
    }

    /// Looks up the specification of `parameter` on `class`.
    pub fn parameter_spec(&self, class: &str, parameter: &str) -> Option<ParamSpec<'_>> {
        self.class_definition(class)?
            .get(parameter)
            .and_then(Value::as_object)
            .map(ParamSpec)
    }

    /// Returns the `config` section, the parameter table for simulation configuration.
    ///
    /// # Errors
    /// Returns `SchemaError::Malformed` if the schema has no `config` section.
    pub fn config_parameters(&self) -> Result<&Map<String, Value>, SchemaError> {
        self.document
            .get("config")
            .and_then(Value::as_object)
            .ok_or_else(|| SchemaError::Malformed("missing config section".to_string()))
    }

    pub fn config_spec(&self, parameter: &str) -> Option<ParamSpec<'_>> {
        self.config_parameters()
            .ok()?
            .get(parameter)
            .and_then(Value::as_object)
            .map(ParamSpec)
    }

    /// Every `config` parameter that declares a default, at that default.
    ///
    /// # Errors
    /// Returns `SchemaError::Malformed` if the schema has no `config` section.
    pub fn config_defaults(&self) -> Result<Map<String, Value>, SchemaError> {
        let mut defaults = Map::new();
        for (name, spec) in self.config_parameters()? {
            if let Some(spec) = spec.as_object().map(ParamSpec) {
                if let Some(default) = spec.default_value() {
                    defaults.insert(name.clone(), default);
                }
            }
        }
        Ok(defaults)
    }

    /// Creates an instance of `class` with every parameter at its schema default.
    ///
    /// # Errors
    /// Returns `SchemaError::UnknownClass` if the schema does not declare `class`.
    pub fn class_with_defaults(
        self: &Arc<Self>,
        class: &str,
    ) -> Result<SchemaObject, SchemaError> {
        let values = self.defaults_for(class, 0)?;
        trace!("created {class} with {} parameters", values.len());
        Ok(SchemaObject {
            schema: Arc::clone(self),
            class: class.to_string(),
            values,
        })
    }

    fn defaults_for(&self, class: &str, depth: usize) -> Result<Map<String, Value>, SchemaError> {
        let definition = self
            .class_definition(class)
            .ok_or_else(|| SchemaError::UnknownClass(class.to_string()))?;

        let mut values = Map::new();
        for (name, raw) in definition {
            if name == CLASS_KEY || name == SIM_TYPES_KEY {
                continue;
            }
            let Some(spec) = raw.as_object().map(ParamSpec) else {
                continue;
            };
            if let Some(default) = spec.default_value() {
                values.insert(name.clone(), default);
                continue;
            }
            match spec.type_name() {
                Some(t) if t.starts_with("idmAbstractType:") => {
                    values.insert(name.clone(), Value::Object(Map::new()));
                }
                Some(t) if t.starts_with("idmType:") && depth < MAX_NESTING_DEPTH => {
                    if self.has_class(t) {
                        let nested = self.defaults_for(t, depth + 1)?;
                        values.insert(name.clone(), Value::Object(nested));
                    }
                }
                Some(t) if t.starts_with("Vector") => {
                    values.insert(name.clone(), Value::Array(Vec::new()));
                }
                _ => {}
            }
        }
        // Concrete `idmType:*` objects are embedded without a class tag.
        if !class.starts_with("idmType:") {
            values.insert(CLASS_KEY.to_string(), Value::String(class.to_string()));
        }
        Ok(values)
    }
}

/// A view over one parameter's schema entry.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec<'a>(&'a Map<String, Value>);

impl<'a> ParamSpec<'a> {
    pub fn type_name(&self) -> Option<&'a str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn min(&self) -> Option<f64> {
        self.0.get("min").and_then(Value::as_f64)
    }

    pub fn max(&self) -> Option<f64> {
        self.0.get("max").and_then(Value::as_f64)
    }

    /// The `depends-on` conditions as (parameter, accepted values) pairs.
    pub fn depends_on(&self) -> Option<&'a Map<String, Value>> {
        self.0.get("depends-on").and_then(Value::as_object)
    }

    pub fn default_value(&self) -> Option<Value> {
        let default = self.0.get("default")?;
        match self.type_name() {
            Some("bool") => Some(normalize_bool(default).unwrap_or_else(|| default.clone())),
            _ => Some(default.clone()),
        }
    }

    /// Checks `value` against this parameter's type, range and enum constraints, returning the
    /// value in the form EMOD expects on disk (booleans become 0/1).
    ///
    /// # Errors
    /// Returns the `SchemaError` describing the first violated constraint.
    pub fn validate(&self, parameter: &str, value: Value) -> Result<Value, SchemaError> {
        let mismatch = |expected: &str, found: &Value| SchemaError::TypeMismatch {
            parameter: parameter.to_string(),
            expected: expected.to_string(),
            found: describe(found),
        };

        match self.type_name() {
            Some("float") => {
                let number = value.as_f64().ok_or_else(|| mismatch("a number", &value))?;
                self.check_range(parameter, number)?;
                Ok(value)
            }
            Some("integer") => {
                let number = value.as_f64().ok_or_else(|| mismatch("an integer", &value))?;
                if number.fract() != 0.0 {
                    return Err(mismatch("an integer", &value));
                }
                self.check_range(parameter, number)?;
                #[allow(clippy::cast_possible_truncation)]
                Ok(Value::from(number as i64))
            }
            Some("bool") => normalize_bool(&value).ok_or_else(|| mismatch("a boolean", &value)),
            Some("enum") => {
                let text = value.as_str().ok_or_else(|| mismatch("a string", &value))?;
                let allowed = self.0.get("enum").and_then(Value::as_array);
                if let Some(allowed) = allowed {
                    if !allowed.iter().any(|option| option.as_str() == Some(text)) {
                        return Err(SchemaError::InvalidEnumValue {
                            parameter: parameter.to_string(),
                            value: text.to_string(),
                        });
                    }
                }
                Ok(value)
            }
            Some("string" | "Constrained String" | "fixed-string") => {
                if value.is_string() {
                    Ok(value)
                } else {
                    Err(mismatch("a string", &value))
                }
            }
            Some(t) if t.starts_with("Vector") => {
                if value.is_array() {
                    Ok(value)
                } else {
                    Err(mismatch("a list", &value))
                }
            }
            Some(t) if t.starts_with("idmType:") || t.starts_with("idmAbstractType:") => {
                if value.is_object() || value.is_array() {
                    Ok(value)
                } else {
                    Err(mismatch(t, &value))
                }
            }
            _ => Ok(value),
        }
    }

    fn check_range(&self, parameter: &str, value: f64) -> Result<(), SchemaError> {
        let min = self.min().unwrap_or(f64::NEG_INFINITY);
        let max = self.max().unwrap_or(f64::INFINITY);
        if value < min || value > max {
            return Err(SchemaError::OutOfRange {
                parameter: parameter.to_string(),
                value,
                min,
                max,
            });
        }
        Ok(())
    }
}

fn normalize_bool(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(flag) => Some(Value::from(u8::from(*flag))),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 0.0 => Some(Value::from(0)),
            Some(x) if x == 1.0 => Some(Value::from(1)),
            _ => None,
        },
        _ => None,
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("bool {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "a list".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}

/// An instance of a schema class whose fields can only be set to schema-valid values.
#[derive(Debug, Clone)]
pub struct SchemaObject {
    schema: Arc<Schema>,
    class: String,
    values: Map<String, Value>,
}

impl SchemaObject {
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn get(&self, parameter: &str) -> Option<&Value> {
        self.values.get(parameter)
    }

    /// Assigns `parameter`, validating it against the class definition.
    ///
    /// # Errors
    /// Returns `SchemaError::UnknownParameter` if the class does not declare `parameter`, or the
    /// validation error if the value is not acceptable.
    pub fn set(&mut self, parameter: &str, value: impl Into<Value>) -> Result<(), SchemaError> {
        if parameter == CLASS_KEY {
            return Err(SchemaError::UnknownParameter {
                class: self.class.clone(),
                parameter: parameter.to_string(),
            });
        }
        let spec = self
            .schema
            .parameter_spec(&self.class, parameter)
            .ok_or_else(|| SchemaError::UnknownParameter {
                class: self.class.clone(),
                parameter: parameter.to_string(),
            })?;
        let value = spec.validate(parameter, value.into())?;
        self.values.insert(parameter.to_string(), value);
        Ok(())
    }

    /// The object as JSON, `class` included.
    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn into_json(self) -> Value {
        Value::Object(self.values)
    }
}

impl From<SchemaObject> for Value {
    fn from(object: SchemaObject) -> Self {
        object.into_json()
    }
}

impl Serialize for SchemaObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}
