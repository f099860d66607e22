//! Semantic roles of variables.
//!
//! Wide sources combine any of identifier, measure and attribute. Key-value
//! sources carry exactly one of identifier, descriptor, contextual, synthetic-id
//! or value. Roles either come from the descriptor or are assigned by the
//! [`RoleClassifier`] from names, labels and a small sample of rows.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::BuildHasherDefault;
use std::str::FromStr;

// used to recognize conventional identifier and key names
use regex::Regex;
// so regular expressions don't have to be recompiled
use lazy_static::lazy_static;
// fast hashing for the uniqueness check
use seahash::SeaHasher;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datatype::XsdType;
use crate::descriptor::{Cell, Descriptor, MeasurementLevel, RowSource, SourceFormat, Variable};
use crate::error::{ConversionError, Result};

lazy_static! {
    static ref IDENTIFIER_NAME: Regex =
        Regex::new(r"(?i)(^id$|_id$|^id_|identifier|uuid|^key$|_key$|^pk$)").unwrap();
    static ref IDENTIFIER_LABEL: Regex =
        Regex::new(r"(?i)\b(id|identifier|uuid|key)\b").unwrap();
    static ref SYNTHETIC_ID_NAME: Regex =
        Regex::new(r"(?i)^(_id|_?row_?id|_?record_?id|_?synthetic_?id)$").unwrap();
    static ref CONTEXTUAL_NAME: Regex = Regex::new(r"(?i)^(key(-\d+)?|path)$").unwrap();
}

// ------------- Policy -------------
/// How the name heuristic and the uniqueness heuristic combine when deciding
/// whether a variable without explicit roles is an identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierPolicy {
    /// Either heuristic is enough.
    #[default]
    NameOrUnique,
    /// A name or label match counts only if the sampled values are unique.
    NameAndUnique,
    /// Only names and labels are considered.
    NameOnly,
}

// ------------- Roles -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WideRole {
    Identifier,
    Measure,
    Attribute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValueRole {
    Identifier,
    Descriptor,
    Contextual,
    SyntheticId,
    Value,
}

impl FromStr for WideRole {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match normalize(s).as_str() {
            "identifier" | "id" => Ok(WideRole::Identifier),
            "measure" => Ok(WideRole::Measure),
            "attribute" => Ok(WideRole::Attribute),
            _ => Err(()),
        }
    }
}

impl FromStr for KeyValueRole {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match normalize(s).as_str() {
            "identifier" | "id" => Ok(KeyValueRole::Identifier),
            "descriptor" | "variabledescriptor" => Ok(KeyValueRole::Descriptor),
            "contextual" => Ok(KeyValueRole::Contextual),
            "syntheticid" => Ok(KeyValueRole::SyntheticId),
            "value" | "variablevalue" => Ok(KeyValueRole::Value),
            _ => Err(()),
        }
    }
}

fn normalize(role: &str) -> String {
    role.trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-' && *c != ' ')
        .flat_map(char::to_lowercase)
        .collect()
}

impl fmt::Display for WideRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WideRole::Identifier => "identifier",
            WideRole::Measure => "measure",
            WideRole::Attribute => "attribute",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for KeyValueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyValueRole::Identifier => "identifier",
            KeyValueRole::Descriptor => "descriptor",
            KeyValueRole::Contextual => "contextual",
            KeyValueRole::SyntheticId => "synthetic-id",
            KeyValueRole::Value => "value",
        };
        write!(f, "{}", name)
    }
}

/// The roles of one variable. The variant always matches the source format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoleSet {
    Wide(BTreeSet<WideRole>),
    KeyValue(KeyValueRole),
}

impl RoleSet {
    pub fn wide(roles: &[WideRole]) -> Self {
        RoleSet::Wide(roles.iter().copied().collect())
    }
    pub fn is_identifier(&self) -> bool {
        match self {
            RoleSet::Wide(roles) => roles.contains(&WideRole::Identifier),
            RoleSet::KeyValue(role) => *role == KeyValueRole::Identifier,
        }
    }
    pub fn len(&self) -> usize {
        match self {
            RoleSet::Wide(roles) => roles.len(),
            RoleSet::KeyValue(_) => 1,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleSet::Wide(roles) => {
                let names: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
            RoleSet::KeyValue(role) => write!(f, "{{{}}}", role),
        }
    }
}

// ------------- Classifier -------------
#[derive(Debug, Clone, Default)]
pub struct RoleClassifier {
    policy: IdentifierPolicy,
}

impl RoleClassifier {
    pub fn new(policy: IdentifierPolicy) -> Self {
        Self { policy }
    }
    pub fn policy(&self) -> IdentifierPolicy {
        self.policy
    }

    /// Roles for every variable, in declaration order. Explicit roles in the
    /// descriptor are validated and win over the heuristics; the heuristics see
    /// at most `preview_rows` rows.
    pub fn classify_all(
        &self,
        descriptor: &Descriptor,
        rows: &dyn RowSource,
        preview_rows: usize,
    ) -> Result<Vec<RoleSet>> {
        let needs_sample = descriptor.variables().iter().any(|v| v.assigned_roles().is_none());
        let sample_len = if needs_sample {
            let declared = usize::try_from(descriptor.record_count()).unwrap_or(usize::MAX);
            preview_rows.min(rows.row_count()).min(declared)
        } else {
            0
        };
        let sample = if sample_len > 0 {
            rows.read_rows(0..sample_len, None)?
        } else {
            Vec::new()
        };
        let mut roles = Vec::with_capacity(descriptor.width());
        for (index, variable) in descriptor.variables().iter().enumerate() {
            let column: Vec<Cell> = sample
                .iter()
                .filter_map(|row| row.get(index).cloned())
                .collect();
            let assigned = self.classify(variable, descriptor.format(), &column)?;
            debug!(variable = variable.name(), roles = %assigned, "classified variable");
            roles.push(assigned);
        }
        Ok(roles)
    }

    /// Roles of a single variable given its sampled cells (possibly none).
    pub fn classify(&self, variable: &Variable, format: &SourceFormat, sample: &[Cell]) -> Result<RoleSet> {
        match variable.assigned_roles() {
            Some(explicit) => explicit_roles(variable, format, explicit),
            None => Ok(self.default_roles(variable, format, sample)),
        }
    }

    fn default_roles(&self, variable: &Variable, format: &SourceFormat, sample: &[Cell]) -> RoleSet {
        match format {
            SourceFormat::Wide { .. } => {
                if self.is_identifier(variable, sample) {
                    RoleSet::wide(&[WideRole::Identifier])
                } else {
                    RoleSet::wide(&[WideRole::Measure])
                }
            }
            SourceFormat::KeyValue => {
                let role = if SYNTHETIC_ID_NAME.is_match(variable.name()) {
                    KeyValueRole::SyntheticId
                } else if CONTEXTUAL_NAME.is_match(variable.name()) {
                    KeyValueRole::Contextual
                } else if self.is_identifier(variable, sample) {
                    KeyValueRole::Identifier
                } else {
                    KeyValueRole::Value
                };
                RoleSet::KeyValue(role)
            }
        }
    }

    fn is_identifier(&self, variable: &Variable, sample: &[Cell]) -> bool {
        let named = IDENTIFIER_NAME.is_match(variable.name())
            || (variable.has_label() && IDENTIFIER_LABEL.is_match(variable.label()));
        match self.policy {
            IdentifierPolicy::NameOnly => named,
            IdentifierPolicy::NameOrUnique => named || unique_heuristic(variable, sample),
            IdentifierPolicy::NameAndUnique => named && (sample.len() < 2 || all_distinct(sample)),
        }
    }
}

/// Applies only to variables without a measurement level whose values are not
/// continuous, and only when at least two rows were sampled.
fn unique_heuristic(variable: &Variable, sample: &[Cell]) -> bool {
    if variable.measure() != MeasurementLevel::Unknown || sample.len() < 2 {
        return false;
    }
    let continuous = matches!(
        XsdType::map_declared(variable.declared_type()),
        Some(XsdType::Float | XsdType::Double | XsdType::Decimal)
    );
    !continuous && all_distinct(sample)
}

fn all_distinct(sample: &[Cell]) -> bool {
    let mut seen: HashSet<String, BuildHasherDefault<SeaHasher>> = HashSet::default();
    sample.iter().all(|cell| !cell.is_null() && seen.insert(cell.to_string()))
}

fn explicit_roles(variable: &Variable, format: &SourceFormat, explicit: &[String]) -> Result<RoleSet> {
    if explicit.is_empty() {
        return Err(ConversionError::EmptyRoleSet { variable: variable.name().to_owned() });
    }
    let mismatch = |role: &String| ConversionError::RoleMismatch {
        variable: variable.name().to_owned(),
        role: role.clone(),
        format: format.name().to_owned(),
    };
    match format {
        SourceFormat::Wide { .. } => {
            let mut roles = BTreeSet::new();
            for role in explicit {
                roles.insert(WideRole::from_str(role).map_err(|_| mismatch(role))?);
            }
            Ok(RoleSet::Wide(roles))
        }
        SourceFormat::KeyValue => {
            let mut roles = BTreeSet::new();
            for role in explicit {
                roles.insert(KeyValueRole::from_str(role).map_err(|_| mismatch(role))?);
            }
            let mut roles = roles.into_iter();
            match (roles.next(), roles.next()) {
                (Some(role), None) => Ok(RoleSet::KeyValue(role)),
                _ => Err(ConversionError::Descriptor(format!(
                    "key-value variable '{}' must carry exactly one role, got {}",
                    variable.name(),
                    explicit.join(", ")
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[i64]) -> Vec<Cell> {
        values.iter().map(|v| Cell::Integer(*v)).collect()
    }

    #[test]
    fn identifier_by_name_or_unique_values() {
        let classifier = RoleClassifier::default();
        let wide = SourceFormat::tabular();
        let respondent = Variable::new("respondent_id", "int64").with_measure(MeasurementLevel::Nominal);
        assert!(classifier.classify(&respondent, &wide, &[]).expect("roles").is_identifier());

        let serial = Variable::new("serial", "int32");
        assert!(classifier.classify(&serial, &wide, &cells(&[4, 8, 15])).expect("roles").is_identifier());
        assert!(!classifier.classify(&serial, &wide, &cells(&[4, 4, 15])).expect("roles").is_identifier());

        let rated = Variable::new("serial", "int32").with_measure(MeasurementLevel::Ordinal);
        assert_eq!(
            classifier.classify(&rated, &wide, &cells(&[1, 2, 3])).expect("roles"),
            RoleSet::wide(&[WideRole::Measure])
        );
    }

    #[test]
    fn name_and_unique_requires_confirmation() {
        let classifier = RoleClassifier::new(IdentifierPolicy::NameAndUnique);
        let wide = SourceFormat::tabular();
        let id = Variable::new("household_id", "int64");
        assert!(classifier.classify(&id, &wide, &cells(&[1, 2])).expect("roles").is_identifier());
        assert!(!classifier.classify(&id, &wide, &cells(&[1, 1])).expect("roles").is_identifier());
        assert!(classifier.classify(&id, &wide, &[]).expect("roles").is_identifier());
    }

    #[test]
    fn key_value_defaults() {
        let classifier = RoleClassifier::new(IdentifierPolicy::NameOnly);
        let kv = SourceFormat::KeyValue;
        let role = |name: &str| classifier.classify(&Variable::new(name, "string"), &kv, &[]).expect("roles");
        assert_eq!(role("_id"), RoleSet::KeyValue(KeyValueRole::SyntheticId));
        assert_eq!(role("record_key"), RoleSet::KeyValue(KeyValueRole::Identifier));
        assert_eq!(role("key-2"), RoleSet::KeyValue(KeyValueRole::Contextual));
        assert_eq!(role("key"), RoleSet::KeyValue(KeyValueRole::Contextual));
        assert_eq!(role("value"), RoleSet::KeyValue(KeyValueRole::Value));
    }

    #[test]
    fn explicit_roles_are_validated() {
        let classifier = RoleClassifier::default();
        let empty = Variable::new("x", "int").with_roles(&[]);
        assert!(matches!(
            classifier.classify(&empty, &SourceFormat::tabular(), &[]),
            Err(ConversionError::EmptyRoleSet { .. })
        ));
        let wrong = Variable::new("x", "int").with_roles(&["contextual"]);
        assert!(matches!(
            classifier.classify(&wrong, &SourceFormat::tabular(), &[]),
            Err(ConversionError::RoleMismatch { .. })
        ));
        let both = Variable::new("x", "int").with_roles(&["identifier", "measure"]);
        assert_eq!(
            classifier.classify(&both, &SourceFormat::tabular(), &[]).expect("roles").len(),
            2
        );
        let two = Variable::new("x", "int").with_roles(&["value", "descriptor"]);
        assert!(classifier.classify(&two, &SourceFormat::KeyValue, &[]).is_err());
    }
}
