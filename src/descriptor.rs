//! The normalized, variable-level description of a source dataset.
//!
//! Descriptors are produced by format readers (statistical, delimited, key-value)
//! that live outside this crate. Once built, a [`Descriptor`] is never mutated;
//! the generation engine only reads from it.

use std::fmt;
use std::ops::Range;

// used to keep the one-to-one mapping between variable names and declaration order
use bimap::BiMap;
use serde::{Deserialize, Serialize};

use crate::datatype::Decimal;
use crate::error::{ConversionError, Result};

// ------------- Source format -------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WideLayout {
    /// Statistical or delimited files, one row per record.
    #[default]
    Tabular,
    /// Gridded files flattened to one row per grid cell.
    Dimensional,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFormat {
    Wide {
        #[serde(default)]
        layout: WideLayout,
        #[serde(default)]
        delimiter: Option<String>,
    },
    KeyValue,
}

impl SourceFormat {
    pub fn tabular() -> Self {
        SourceFormat::Wide { layout: WideLayout::Tabular, delimiter: None }
    }
    pub fn delimited(delimiter: &str) -> Self {
        SourceFormat::Wide { layout: WideLayout::Tabular, delimiter: Some(delimiter.to_owned()) }
    }
    pub fn dimensional() -> Self {
        SourceFormat::Wide { layout: WideLayout::Dimensional, delimiter: None }
    }
    pub fn is_key_value(&self) -> bool {
        matches!(self, SourceFormat::KeyValue)
    }
    pub fn name(&self) -> &'static str {
        match self {
            SourceFormat::Wide { .. } => "wide",
            SourceFormat::KeyValue => "key-value",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ------------- Measurement level -------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementLevel {
    Nominal,
    Ordinal,
    #[serde(alias = "continuous", alias = "ratio", alias = "interval")]
    Scale,
    #[default]
    Unknown,
}

impl MeasurementLevel {
    pub fn classification_level(&self) -> &'static str {
        match self {
            MeasurementLevel::Nominal | MeasurementLevel::Unknown => "Nominal",
            MeasurementLevel::Ordinal => "Ordinal",
            MeasurementLevel::Scale => "Continuous",
        }
    }
}

// ------------- Cell -------------
/// A raw value as delivered by a row accessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Float(f) => f.is_nan(),
            _ => false,
        }
    }
    /// Numeric view of the cell, also for numeric text such as `"-99"`.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Cell::Integer(i) => Decimal::from_str(&i.to_string()),
            Cell::Float(f) if f.is_finite() => Decimal::from_str(&f.to_string()),
            Cell::Text(s) => Decimal::from_str(s.trim()),
            _ => None,
        }
    }
    /// Code equality used for value labels and sentinel code sets: numeric codes
    /// compare by value (`-99` equals `"-99.0"`), everything else by text.
    pub fn same_code(&self, other: &Cell) -> bool {
        match (self.as_decimal(), other.as_decimal()) {
            (Some(a), Some(b)) => a == b,
            _ => !self.is_null() && !other.is_null() && self.to_string() == other.to_string(),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, ""),
            Cell::Boolean(b) => write!(f, "{}", b),
            Cell::Integer(i) => write!(f, "{}", i),
            Cell::Float(x) => write!(f, "{}", x),
            Cell::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self { Cell::Text(s.to_owned()) }
}
impl From<String> for Cell {
    fn from(s: String) -> Self { Cell::Text(s) }
}
impl From<i64> for Cell {
    fn from(i: i64) -> Self { Cell::Integer(i) }
}
impl From<f64> for Cell {
    fn from(x: f64) -> Self { Cell::Float(x) }
}
impl From<bool> for Cell {
    fn from(b: bool) -> Self { Cell::Boolean(b) }
}

// ------------- Value labels and missing values -------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueLabel {
    pub code: Cell,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValues {
    /// Explicit sentinel codes, e.g. `[-9, -8]` or `["NA"]`.
    Codes(Vec<Cell>),
    /// Inclusive numeric range, e.g. `-99 ..= -90`.
    Range { lo: f64, hi: f64 },
}

// ------------- Variable -------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    name: String,
    #[serde(rename = "type")]
    declared_type: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    measure: MeasurementLevel,
    /// Explicit role assignment; `None` leaves it to the default classification.
    #[serde(default)]
    roles: Option<Vec<String>>,
    #[serde(default)]
    value_labels: Vec<ValueLabel>,
    #[serde(default)]
    missing: Option<MissingValues>,
}

impl Variable {
    pub fn new(name: &str, declared_type: &str) -> Self {
        Self {
            name: name.to_owned(),
            declared_type: declared_type.to_owned(),
            label: None,
            measure: MeasurementLevel::Unknown,
            roles: None,
            value_labels: Vec::new(),
            missing: None,
        }
    }
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_owned());
        self
    }
    pub fn with_measure(mut self, measure: MeasurementLevel) -> Self {
        self.measure = measure;
        self
    }
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = Some(roles.iter().map(|r| r.to_string()).collect());
        self
    }
    pub fn with_value_label(mut self, code: impl Into<Cell>, label: &str) -> Self {
        self.value_labels.push(ValueLabel { code: code.into(), label: label.to_owned() });
        self
    }
    pub fn with_missing(mut self, missing: MissingValues) -> Self {
        self.missing = Some(missing);
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }
    /// The display label, falling back to the name.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
    pub fn has_label(&self) -> bool {
        self.label.is_some()
    }
    pub fn measure(&self) -> MeasurementLevel {
        self.measure
    }
    pub fn assigned_roles(&self) -> Option<&[String]> {
        self.roles.as_deref()
    }
    pub fn value_labels(&self) -> &[ValueLabel] {
        &self.value_labels
    }
    pub fn missing(&self) -> Option<&MissingValues> {
        self.missing.as_ref()
    }
}

// ------------- Dimension -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub size: u64,
}

// ------------- Descriptor -------------
/// Serialized form of a descriptor, as written by the format readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorSpec {
    pub file_name: String,
    pub format: SourceFormat,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub record_count: Option<u64>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    /// Optional materialized rows, one inner array per record in declaration order.
    #[serde(default)]
    pub rows: Option<Vec<Vec<Cell>>>,
}

#[derive(Debug, Clone)]
pub struct Descriptor {
    file_name: String,
    format: SourceFormat,
    variables: Vec<Variable>,
    record_count: u64,
    dimensions: Vec<Dimension>,
    positions: BiMap<String, usize>,
}

impl Descriptor {
    pub fn new(
        file_name: &str,
        format: SourceFormat,
        variables: Vec<Variable>,
        record_count: u64,
    ) -> Result<Self> {
        Self::build(file_name.to_owned(), format, variables, Some(record_count), Vec::new())
    }

    /// A descriptor whose record count is the product of its dimension sizes.
    pub fn with_dimensions(
        file_name: &str,
        format: SourceFormat,
        variables: Vec<Variable>,
        dimensions: Vec<Dimension>,
    ) -> Result<Self> {
        Self::build(file_name.to_owned(), format, variables, None, dimensions)
    }

    /// Splits a serialized descriptor into the descriptor and its materialized rows (if any).
    pub fn from_spec(spec: DescriptorSpec) -> Result<(Self, Option<InMemoryRows>)> {
        let descriptor = Self::build(
            spec.file_name,
            spec.format,
            spec.variables,
            spec.record_count,
            spec.dimensions,
        )?;
        let rows = match spec.rows {
            Some(rows) => Some(InMemoryRows::new(descriptor.width(), rows)?),
            None => None,
        };
        Ok((descriptor, rows))
    }

    fn build(
        file_name: String,
        format: SourceFormat,
        variables: Vec<Variable>,
        record_count: Option<u64>,
        dimensions: Vec<Dimension>,
    ) -> Result<Self> {
        if variables.is_empty() {
            return Err(ConversionError::Descriptor(format!(
                "'{}' has no variable list",
                file_name
            )));
        }
        let mut positions = BiMap::new();
        for (index, variable) in variables.iter().enumerate() {
            if variable.name().trim().is_empty() {
                return Err(ConversionError::Descriptor(format!(
                    "variable at position {} has an empty name",
                    index + 1
                )));
            }
            if positions.insert_no_overwrite(variable.name().to_owned(), index).is_err() {
                return Err(ConversionError::Descriptor(format!(
                    "variable '{}' is declared more than once",
                    variable.name()
                )));
            }
        }
        let dimension_product = if dimensions.is_empty() {
            None
        } else {
            let product = dimensions
                .iter()
                .try_fold(1u64, |acc, d| acc.checked_mul(d.size))
                .ok_or_else(|| ConversionError::Descriptor("dimension sizes overflow the record count".into()))?;
            Some(product)
        };
        let record_count = match (record_count, dimension_product) {
            (Some(declared), Some(product)) if declared != product => {
                return Err(ConversionError::Descriptor(format!(
                    "record count {} disagrees with the dimension product {}",
                    declared, product
                )));
            }
            (Some(declared), _) => declared,
            (None, Some(product)) => product,
            (None, None) => {
                return Err(ConversionError::Descriptor(format!(
                    "'{}' declares neither a record count nor dimensions",
                    file_name
                )));
            }
        };
        Ok(Self {
            file_name,
            format,
            variables,
            record_count,
            dimensions,
            positions,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
    pub fn format(&self) -> &SourceFormat {
        &self.format
    }
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.position(name).and_then(|i| self.variables.get(i))
    }
    /// Zero-based declaration index of a variable.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get_by_left(name).copied()
    }
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.positions.get_by_right(&index).map(String::as_str)
    }
    pub fn record_count(&self) -> u64 {
        self.record_count
    }
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }
    pub fn width(&self) -> usize {
        self.variables.len()
    }
}

// ------------- Row access -------------
/// Range reads over the source rows. Reads must be repeatable: asking for the
/// same range twice returns the same cells.
pub trait RowSource {
    fn row_count(&self) -> usize;
    /// Cells for `rows`, restricted to `columns` (declaration indexes) when given.
    fn read_rows(&self, rows: Range<usize>, columns: Option<&[usize]>) -> Result<Vec<Vec<Cell>>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRows {
    width: usize,
    rows: Vec<Vec<Cell>>,
}

impl InMemoryRows {
    pub fn new(width: usize, rows: Vec<Vec<Cell>>) -> Result<Self> {
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(ConversionError::RowAccess(format!(
                "row {} has {} cells, expected {}",
                index,
                row.len(),
                width
            )));
        }
        Ok(Self { width, rows })
    }
    pub fn empty(width: usize) -> Self {
        Self { width, rows: Vec::new() }
    }
    pub fn width(&self) -> usize {
        self.width
    }
}

impl RowSource for InMemoryRows {
    fn row_count(&self) -> usize {
        self.rows.len()
    }
    fn read_rows(&self, rows: Range<usize>, columns: Option<&[usize]>) -> Result<Vec<Vec<Cell>>> {
        let slice = self.rows.get(rows.clone()).ok_or_else(|| {
            ConversionError::RowAccess(format!(
                "rows {}..{} out of bounds for {} rows",
                rows.start,
                rows.end,
                self.rows.len()
            ))
        })?;
        match columns {
            None => Ok(slice.to_vec()),
            Some(columns) => slice
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|&c| {
                            row.get(c).cloned().ok_or_else(|| {
                                ConversionError::RowAccess(format!("column {} out of bounds", c))
                            })
                        })
                        .collect()
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_codes_compare_by_value() {
        assert!(Cell::Integer(-99).same_code(&Cell::Text("-99.0".into())));
        assert!(Cell::Text("NA".into()).same_code(&Cell::Text("NA".into())));
        assert!(!Cell::Null.same_code(&Cell::Null));
    }

    #[test]
    fn column_subset_reads() {
        let rows = InMemoryRows::new(2, vec![vec![1i64.into(), "a".into()], vec![2i64.into(), "b".into()]])
            .expect("rows");
        let read = rows.read_rows(0..2, Some(&[1])).expect("read");
        assert_eq!(read, vec![vec![Cell::from("a")], vec![Cell::from("b")]]);
        assert!(rows.read_rows(1..3, None).is_err());
    }
}
