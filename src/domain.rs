//! Substantive and sentinel value domains.
//!
//! Every variable gets one substantive domain: coded when it carries value labels
//! that are not sentinel codes, unbounded (typed only) otherwise. Variables with a
//! missing-value specification also get one sentinel domain. Domains are pure
//! functions of the variable, so their identifiers and nodes are reproducible.

use std::fmt;

use crate::datatype::{Decimal, XsdType};
use crate::descriptor::{Cell, MeasurementLevel, MissingValues, ValueLabel, Variable};
use crate::error::{ConversionError, Result};
use crate::graph::{Node, NodeId, NodeKind};

// ------------- Sentinel specification -------------
#[derive(Debug, Clone, PartialEq)]
pub enum SentinelSpec {
    Codes(Vec<Cell>),
    /// Inclusive on both ends.
    Range { lo: Decimal, hi: Decimal },
}

impl SentinelSpec {
    fn from_missing(variable: &str, missing: &MissingValues) -> Result<Self> {
        match missing {
            MissingValues::Codes(codes) => {
                let codes: Vec<Cell> = codes.iter().filter(|c| !c.is_null()).cloned().collect();
                if codes.is_empty() {
                    return Err(ConversionError::Descriptor(format!(
                        "variable '{}' declares an empty sentinel code set",
                        variable
                    )));
                }
                Ok(SentinelSpec::Codes(codes))
            }
            MissingValues::Range { lo, hi } => {
                let bounds = Decimal::from_f64(*lo).zip(Decimal::from_f64(*hi));
                match bounds {
                    Some((lo, hi)) if lo <= hi => Ok(SentinelSpec::Range { lo, hi }),
                    _ => Err(ConversionError::Descriptor(format!(
                        "variable '{}' declares an invalid sentinel range {} ..= {}",
                        variable, lo, hi
                    ))),
                }
            }
        }
    }

    pub fn contains(&self, cell: &Cell) -> bool {
        match self {
            SentinelSpec::Codes(codes) => codes.iter().any(|code| code.same_code(cell)),
            SentinelSpec::Range { lo, hi } => cell
                .as_decimal()
                .is_some_and(|value| *lo <= value && value <= *hi),
        }
    }

    /// Smallest and largest sentinel value, numerically when every code is numeric.
    pub fn bounds(&self) -> (String, String) {
        match self {
            SentinelSpec::Range { lo, hi } => (lo.to_string(), hi.to_string()),
            SentinelSpec::Codes(codes) => {
                let numeric: Option<Vec<Decimal>> = codes.iter().map(Cell::as_decimal).collect();
                match numeric {
                    Some(mut values) => {
                        values.sort();
                        let first = values.first().map(|v| v.to_string()).unwrap_or_default();
                        let last = values.last().map(|v| v.to_string()).unwrap_or_default();
                        (first, last)
                    }
                    None => {
                        let mut texts: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
                        texts.sort();
                        let first = texts.first().cloned().unwrap_or_default();
                        let last = texts.last().cloned().unwrap_or_default();
                        (first, last)
                    }
                }
            }
        }
    }
}

impl fmt::Display for SentinelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SentinelSpec::Codes(codes) => {
                let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
                write!(f, "codes {{{}}}", codes.join(", "))
            }
            SentinelSpec::Range { lo, hi } => write!(f, "range [{}, {}]", lo, hi),
        }
    }
}

// ------------- Domains -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolution {
    Substantive,
    Sentinel,
    /// The cell matches neither domain.
    Undetermined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubstantiveDomain {
    id: NodeId,
    /// Labelled codes that are not sentinels; empty for unbounded domains.
    codes: Vec<ValueLabel>,
}

impl SubstantiveDomain {
    pub fn id(&self) -> &NodeId {
        &self.id
    }
    pub fn is_coded(&self) -> bool {
        !self.codes.is_empty()
    }
    pub fn codes(&self) -> &[ValueLabel] {
        &self.codes
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentinelDomain {
    id: NodeId,
    spec: SentinelSpec,
    /// Labelled codes that fall inside the sentinel specification.
    codes: Vec<ValueLabel>,
}

impl SentinelDomain {
    pub fn id(&self) -> &NodeId {
        &self.id
    }
    pub fn spec(&self) -> &SentinelSpec {
        &self.spec
    }
    pub fn codes(&self) -> &[ValueLabel] {
        &self.codes
    }
}

/// Both domains of one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueDomains {
    variable: String,
    xsd: XsdType,
    measure: MeasurementLevel,
    labels: Vec<ValueLabel>,
    substantive: SubstantiveDomain,
    sentinel: Option<SentinelDomain>,
}

impl ValueDomains {
    pub fn build(variable: &Variable) -> Result<Self> {
        let name = variable.name();
        let xsd = XsdType::map_declared(variable.declared_type()).ok_or_else(|| {
            ConversionError::UnknownType {
                variable: name.to_owned(),
                declared: variable.declared_type().to_owned(),
            }
        })?;
        let spec = variable
            .missing()
            .map(|missing| SentinelSpec::from_missing(name, missing))
            .transpose()?;
        let (sentinel_codes, substantive_codes): (Vec<ValueLabel>, Vec<ValueLabel>) = variable
            .value_labels()
            .iter()
            .cloned()
            .partition(|label| spec.as_ref().is_some_and(|s| s.contains(&label.code)));
        let substantive = SubstantiveDomain {
            id: NodeId::of("substantiveValueDomain", name),
            codes: substantive_codes,
        };
        let sentinel = spec.map(|spec| SentinelDomain {
            id: NodeId::of("sentinelValueDomain", name),
            spec,
            codes: sentinel_codes,
        });
        Ok(Self {
            variable: name.to_owned(),
            xsd,
            measure: variable.measure(),
            labels: variable.value_labels().to_vec(),
            substantive,
            sentinel,
        })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }
    pub fn xsd(&self) -> XsdType {
        self.xsd
    }
    pub fn substantive(&self) -> &SubstantiveDomain {
        &self.substantive
    }
    pub fn sentinel(&self) -> Option<&SentinelDomain> {
        self.sentinel.as_ref()
    }

    /// Which domain a raw cell value belongs to. Sentinel membership is checked
    /// first; null cells are never resolved.
    pub fn resolve(&self, cell: &Cell) -> Resolution {
        if cell.is_null() {
            return Resolution::Undetermined;
        }
        if self.sentinel.as_ref().is_some_and(|s| s.spec.contains(cell)) {
            return Resolution::Sentinel;
        }
        if self.substantive.codes.iter().any(|label| label.code.same_code(cell)) || self.xsd.conforms(cell) {
            Resolution::Substantive
        } else {
            Resolution::Undetermined
        }
    }

    pub fn domain_for(&self, resolution: &Resolution) -> Option<&NodeId> {
        match resolution {
            Resolution::Substantive => Some(&self.substantive.id),
            Resolution::Sentinel => self.sentinel.as_ref().map(|s| &s.id),
            Resolution::Undetermined => None,
        }
    }

    /// Nodes describing both domains, each one appearing after everything it links to:
    /// concepts, schemes, enumeration domains, descriptions, then the domains.
    pub fn nodes(&self) -> Vec<Node> {
        let name = self.variable.as_str();
        let mut nodes: Vec<Node> = self
            .labels
            .iter()
            .map(|label| {
                Node::new(NodeId::concept(name, &label.code.to_string()), NodeKind::Concept)
                    .typed_string("skos:notation", &label.code.to_string())
                    .typed_string("skos:prefLabel", &label.label)
            })
            .collect();

        let substantive_enumeration =
            self.enumeration(&mut nodes, "substantive", &self.substantive.codes);
        let description = NodeId::of("substantiveValueAndConceptDescription", name);
        nodes.push(
            Node::new(description.clone(), NodeKind::ValueAndConceptDescription)
                .with("classificationLevel", self.measure.classification_level()),
        );
        let mut domain = Node::new(self.substantive.id.clone(), NodeKind::SubstantiveValueDomain)
            .vocabulary_entry("recommendedDataType", &self.xsd.uri())
            .link("isDescribedBy", &description);
        if let Some(enumeration) = substantive_enumeration {
            domain = domain.link("takesValuesFrom", &enumeration);
        }
        nodes.push(domain);

        if let Some(sentinel) = &self.sentinel {
            let sentinel_enumeration = self.enumeration(&mut nodes, "sentinel", &sentinel.codes);
            let description = NodeId::of("sentinelValueAndConceptDescription", name);
            let (minimum, maximum) = sentinel.spec.bounds();
            nodes.push(
                Node::new(description.clone(), NodeKind::ValueAndConceptDescription)
                    .with(
                        "description",
                        serde_json::json!({
                            "@type": "InternationalString",
                            "languageSpecificString": {
                                "@type": "LanguageString",
                                "content": sentinel.spec.to_string()
                            }
                        }),
                    )
                    .with("minimumValueInclusive", minimum)
                    .with("maximumValueInclusive", maximum),
            );
            let mut domain = Node::new(sentinel.id.clone(), NodeKind::SentinelValueDomain)
                .vocabulary_entry("recommendedDataType", &self.xsd.uri())
                .link("isDescribedBy", &description);
            if let Some(enumeration) = sentinel_enumeration {
                domain = domain.link("takesValuesFrom", &enumeration);
            }
            nodes.push(domain);
        }
        nodes
    }

    // concept scheme plus enumeration domain over `codes`, omitted when there are none
    fn enumeration(&self, nodes: &mut Vec<Node>, side: &str, codes: &[ValueLabel]) -> Option<NodeId> {
        if codes.is_empty() {
            return None;
        }
        let name = self.variable.as_str();
        let scheme = NodeId::of(&format!("{}ConceptScheme", side), name);
        let concepts: Vec<NodeId> = codes
            .iter()
            .map(|label| NodeId::concept(name, &label.code.to_string()))
            .collect();
        nodes.push(Node::new(scheme.clone(), NodeKind::ConceptScheme).links("skos:hasTopConcept", &concepts));
        let enumeration = NodeId::of(&format!("{}EnumerationDomain", side), name);
        nodes.push(Node::new(enumeration.clone(), NodeKind::EnumerationDomain).link("sameAs", &scheme));
        Some(enumeration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn income() -> Variable {
        Variable::new("income", "float64").with_missing(MissingValues::Range { lo: -99.0, hi: -90.0 })
    }

    #[test]
    fn sentinel_range_is_inclusive() {
        let domains = ValueDomains::build(&income()).expect("domains");
        assert_eq!(domains.resolve(&Cell::Float(-95.0)), Resolution::Sentinel);
        assert_eq!(domains.resolve(&Cell::Integer(-99)), Resolution::Sentinel);
        assert_eq!(domains.resolve(&Cell::Text("-90".into())), Resolution::Sentinel);
        assert_eq!(domains.resolve(&Cell::Float(-89.5)), Resolution::Substantive);
        assert_eq!(domains.resolve(&Cell::Text("n/a".into())), Resolution::Undetermined);
        assert_eq!(domains.resolve(&Cell::Null), Resolution::Undetermined);
    }

    #[test]
    fn labelled_sentinel_codes_move_to_the_sentinel_scheme() {
        let variable = Variable::new("sex", "int8")
            .with_value_label(1i64, "Male")
            .with_value_label(2i64, "Female")
            .with_value_label(-9i64, "Refused")
            .with_missing(MissingValues::Codes(vec![Cell::Integer(-9)]));
        let domains = ValueDomains::build(&variable).expect("domains");
        assert!(domains.substantive().is_coded());
        assert_eq!(domains.substantive().codes().len(), 2);
        assert_eq!(domains.sentinel().map(|s| s.codes().len()), Some(1));
        let kinds: Vec<NodeKind> = domains.nodes().iter().map(|n| n.kind()).collect();
        assert_eq!(kinds.iter().filter(|k| **k == NodeKind::Concept).count(), 3);
        assert_eq!(kinds.iter().filter(|k| **k == NodeKind::ConceptScheme).count(), 2);
        assert_eq!(kinds.last(), Some(&NodeKind::SentinelValueDomain));
    }

    #[test]
    fn unknown_types_are_rejected() {
        let variable = Variable::new("shape", "geometry");
        assert!(matches!(
            ValueDomains::build(&variable),
            Err(ConversionError::UnknownType { .. })
        ));
    }
}
