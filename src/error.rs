use std::fmt;

use thiserror::Error;

// ------------- Phase -------------
/// The stages a conversion moves through, in order. No stage is ever re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Start,
    StructuralEmit,
    ComponentEmit,
    ValueEmit,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::StructuralEmit => "structural emission",
            Phase::ComponentEmit => "component emission",
            Phase::ValueEmit => "value emission",
            Phase::Done => "done",
        };
        write!(f, "{}", name)
    }
}

// ------------- Errors -------------
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Descriptor error: {0}")]
    Descriptor(String),
    #[error("Variable '{variable}' has an empty role set")]
    EmptyRoleSet { variable: String },
    #[error("Role '{role}' is not valid for {format} sources (variable '{variable}')")]
    RoleMismatch {
        variable: String,
        role: String,
        format: String,
    },
    #[error("Variable '{variable}' declares unknown type '{declared}'")]
    UnknownType { variable: String, declared: String },
    #[error("Row access error: {0}")]
    RowAccess(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Conversion aborted during {phase}: {source}")]
    Phase {
        phase: Phase,
        #[source]
        source: Box<ConversionError>,
    },
}

impl ConversionError {
    pub fn in_phase(self, phase: Phase) -> Self {
        match self {
            // keep the innermost phase, it is the one that failed
            ConversionError::Phase { .. } => self,
            other => ConversionError::Phase {
                phase,
                source: Box::new(other),
            },
        }
    }
    /// The phase a terminal error was raised in, if it has been attributed to one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            ConversionError::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
    /// Unwraps phase attribution and returns the underlying cause.
    pub fn root(&self) -> &ConversionError {
        match self {
            ConversionError::Phase { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConversionError>;

// Helper conversions
impl From<serde_json::Error> for ConversionError {
    fn from(e: serde_json::Error) -> Self { Self::Serialization(e.to_string()) }
}
impl From<std::io::Error> for ConversionError {
    fn from(e: std::io::Error) -> Self { Self::Io(e.to_string()) }
}
impl From<config::ConfigError> for ConversionError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
