use std::fmt::{self, Debug, Display};
use std::io;

/// Errors raised while resolving classes and parameters against an EMOD schema.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// The class name is not declared anywhere under `idmTypes`.
    UnknownClass(String),
    /// The parameter is not declared for the class (or in the `config` section).
    UnknownParameter { class: String, parameter: String },
    /// The value does not have the type the schema declares.
    TypeMismatch {
        parameter: String,
        expected: String,
        found: String,
    },
    /// A numeric value falls outside the schema `min`/`max`.
    OutOfRange {
        parameter: String,
        value: f64,
        min: f64,
        max: f64,
    },
    /// An enum value that is not in the schema's `enum` list.
    InvalidEnumValue { parameter: String, value: String },
    /// The schema document itself is missing a section we need.
    Malformed(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SchemaError::UnknownClass(class) => write!(f, "class {class} not found in schema"),
            SchemaError::UnknownParameter { class, parameter } => {
                write!(f, "{parameter} is not a parameter of {class}")
            }
            SchemaError::TypeMismatch {
                parameter,
                expected,
                found,
            } => write!(f, "{parameter} expects {expected}, found {found}"),
            SchemaError::OutOfRange {
                parameter,
                value,
                min,
                max,
            } => write!(f, "{parameter} = {value} is outside [{min}, {max}]"),
            SchemaError::InvalidEnumValue { parameter, value } => {
                write!(f, "{value} is not an allowed value of {parameter}")
            }
            SchemaError::Malformed(msg) => write!(f, "malformed schema: {msg}"),
        }
    }
}

/// Provides `TyphoidError` and maps other errors to
/// convert to a `TyphoidError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum TyphoidError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    SchemaError(SchemaError),
    DemographicsError(String),
    PlatformError(String),
    TyphoidError(String),
}

impl From<io::Error> for TyphoidError {
    fn from(error: io::Error) -> Self {
        TyphoidError::IoError(error)
    }
}

impl From<serde_json::Error> for TyphoidError {
    fn from(error: serde_json::Error) -> Self {
        TyphoidError::JsonError(error)
    }
}

impl From<csv::Error> for TyphoidError {
    fn from(error: csv::Error) -> Self {
        TyphoidError::CSVError(error)
    }
}

impl From<SchemaError> for TyphoidError {
    fn from(error: SchemaError) -> Self {
        TyphoidError::SchemaError(error)
    }
}

impl From<String> for TyphoidError {
    fn from(error: String) -> Self {
        TyphoidError::TyphoidError(error)
    }
}

impl From<&str> for TyphoidError {
    fn from(error: &str) -> Self {
        TyphoidError::TyphoidError(error.to_string())
    }
}

impl std::error::Error for TyphoidError {}

impl Display for TyphoidError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TyphoidError::SchemaError(error) => write!(f, "Error: schema: {error}"),
            TyphoidError::DemographicsError(msg) => write!(f, "Error: demographics: {msg}"),
            TyphoidError::PlatformError(msg) => write!(f, "Error: platform: {msg}"),
            _ => write!(f, "Error: {self:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_errors_convert_and_display() {
        let err: TyphoidError = SchemaError::UnknownParameter {
            class: "TyphoidCarrierClear".to_string(),
            parameter: "Clearance_Rat".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Error: schema: Clearance_Rat is not a parameter of TyphoidCarrierClear"
        );
    }

    #[test]
    fn string_errors_convert() {
        let err: TyphoidError = "boom".into();
        assert!(matches!(err, TyphoidError::TyphoidError(ref msg) if msg == "boom"));
    }
}
