//! Dataset-level nodes, emitted once per conversion.
//!
//! The source format is inspected exactly once, in [`profile_for`]; everything
//! format-specific afterwards goes through the returned [`StructureProfile`].

use tracing::debug;

use crate::descriptor::{Descriptor, SourceFormat, WideLayout};
use crate::error::{ConversionError, Result};
use crate::graph::{Node, NodeId, NodeKind, NodeSink};
use crate::role::{KeyValueRole, RoleSet, WideRole};

pub const DATA_STORE: &str = "dataStore";
pub const LOGICAL_RECORD: &str = "logicalRecord";
pub const PHYSICAL_DATA_SET: &str = "physicalDataSet";
pub const PHYSICAL_DATA_SET_STRUCTURE: &str = "physicalDataSetStructure";
pub const PHYSICAL_RECORD_SEGMENT: &str = "physicalRecordSegment";
pub const PHYSICAL_SEGMENT_LAYOUT: &str = "physicalSegmentLayout";
pub const PRIMARY_KEY: &str = "primaryKey";

// ------------- Components -------------
/// How a role is expressed as a component node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSpec {
    pub kind: NodeKind,
    pub prefix: &'static str,
    /// Property linking the component to its variable.
    pub defined_by: &'static str,
}

impl ComponentSpec {
    const fn new(kind: NodeKind, prefix: &'static str, defined_by: &'static str) -> Self {
        Self { kind, prefix, defined_by }
    }
    pub fn id(&self, variable: &str) -> NodeId {
        NodeId::of(self.prefix, variable)
    }
}

const BY_INSTANCE: &str = "isDefinedBy_InstanceVariable";
const BY_REPRESENTED: &str = "isDefinedBy_RepresentedVariable";

const IDENTIFIER: ComponentSpec = ComponentSpec::new(NodeKind::IdentifierComponent, "identifierComponent", BY_INSTANCE);
const DIMENSION: ComponentSpec = ComponentSpec::new(NodeKind::DimensionComponent, "dimensionComponent", BY_INSTANCE);
const MEASURE: ComponentSpec = ComponentSpec::new(NodeKind::MeasureComponent, "measureComponent", BY_INSTANCE);
const ATTRIBUTE: ComponentSpec = ComponentSpec::new(NodeKind::AttributeComponent, "attributeComponent", BY_REPRESENTED);
const CONTEXTUAL: ComponentSpec = ComponentSpec::new(NodeKind::ContextualComponent, "contextualComponent", BY_REPRESENTED);
const SYNTHETIC_ID: ComponentSpec = ComponentSpec::new(NodeKind::SyntheticIdComponent, "syntheticIdComponent", BY_REPRESENTED);
const VARIABLE_VALUE: ComponentSpec =
    ComponentSpec::new(NodeKind::VariableValueComponent, "variableValueComponent", BY_REPRESENTED);
const VARIABLE_DESCRIPTOR: ComponentSpec =
    ComponentSpec::new(NodeKind::VariableDescriptorComponent, "variableDescriptorComponent", BY_REPRESENTED);

// ------------- Profiles -------------
pub trait StructureProfile {
    fn dataset(&self) -> (NodeKind, NodeId);
    fn structure(&self) -> (NodeKind, NodeId);
    /// Component kinds for a variable's roles, in role order.
    fn components(&self, roles: &RoleSet) -> Result<Vec<ComponentSpec>>;
    fn emits_primary_key(&self) -> bool;
    /// Delimiter of the physical segment layout, if the records are delimited.
    fn delimiter(&self) -> Option<&str>;
}

#[derive(Debug, Clone)]
pub struct WideProfile {
    layout: WideLayout,
    delimiter: Option<String>,
}

impl StructureProfile for WideProfile {
    fn dataset(&self) -> (NodeKind, NodeId) {
        match self.layout {
            WideLayout::Tabular => (NodeKind::WideDataSet, NodeId::fixed("wideDataSet")),
            WideLayout::Dimensional => (NodeKind::DimensionalDataSet, NodeId::fixed("dimensionalDataSet")),
        }
    }
    fn structure(&self) -> (NodeKind, NodeId) {
        match self.layout {
            WideLayout::Tabular => (NodeKind::WideDataStructure, NodeId::fixed("wideDataStructure")),
            WideLayout::Dimensional => {
                (NodeKind::DimensionalDataStructure, NodeId::fixed("dimensionalDataStructure"))
            }
        }
    }
    fn components(&self, roles: &RoleSet) -> Result<Vec<ComponentSpec>> {
        match roles {
            RoleSet::Wide(roles) => Ok(roles
                .iter()
                .map(|role| match role {
                    WideRole::Identifier if self.layout == WideLayout::Dimensional => DIMENSION,
                    WideRole::Identifier => IDENTIFIER,
                    WideRole::Measure => MEASURE,
                    WideRole::Attribute => ATTRIBUTE,
                })
                .collect()),
            RoleSet::KeyValue(role) => Err(ConversionError::Invariant(format!(
                "key-value role {} reached a wide structure",
                role
            ))),
        }
    }
    fn emits_primary_key(&self) -> bool {
        true
    }
    fn delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct KeyValueProfile {
    /// Hierarchical keys were decomposed into `key-N` columns joined by `/`.
    decomposed_keys: bool,
}

impl StructureProfile for KeyValueProfile {
    fn dataset(&self) -> (NodeKind, NodeId) {
        (NodeKind::KeyValueDataStore, NodeId::fixed("keyValueDataStore"))
    }
    fn structure(&self) -> (NodeKind, NodeId) {
        (NodeKind::KeyValueStructure, NodeId::fixed("keyValueStructure"))
    }
    fn components(&self, roles: &RoleSet) -> Result<Vec<ComponentSpec>> {
        match roles {
            RoleSet::KeyValue(role) => Ok(vec![match role {
                KeyValueRole::Identifier => IDENTIFIER,
                KeyValueRole::Descriptor => VARIABLE_DESCRIPTOR,
                KeyValueRole::Contextual => CONTEXTUAL,
                KeyValueRole::SyntheticId => SYNTHETIC_ID,
                KeyValueRole::Value => VARIABLE_VALUE,
            }]),
            RoleSet::Wide(_) => Err(ConversionError::Invariant(format!(
                "wide roles {} reached a key-value structure",
                roles
            ))),
        }
    }
    fn emits_primary_key(&self) -> bool {
        false
    }
    fn delimiter(&self) -> Option<&str> {
        if self.decomposed_keys { Some("/") } else { None }
    }
}

/// Picks the profile for the descriptor's source format.
pub fn profile_for(descriptor: &Descriptor) -> Box<dyn StructureProfile> {
    match descriptor.format() {
        SourceFormat::Wide { layout, delimiter } => Box::new(WideProfile {
            layout: *layout,
            delimiter: delimiter.clone(),
        }),
        SourceFormat::KeyValue => {
            let has_key_columns = descriptor.variables().iter().any(|v| {
                v.name()
                    .strip_prefix("key-")
                    .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
            });
            Box::new(KeyValueProfile {
                decomposed_keys: has_key_columns && descriptor.variable("value").is_some(),
            })
        }
    }
}

// ------------- Builder -------------
pub struct StructuralBuilder<'a> {
    descriptor: &'a Descriptor,
    profile: Box<dyn StructureProfile>,
}

impl<'a> StructuralBuilder<'a> {
    pub fn new(descriptor: &'a Descriptor) -> Self {
        Self {
            descriptor,
            profile: profile_for(descriptor),
        }
    }
    pub fn profile(&self) -> &dyn StructureProfile {
        self.profile.as_ref()
    }
    pub fn dataset_id(&self) -> NodeId {
        self.profile.dataset().1
    }
    pub fn structure_id(&self) -> NodeId {
        self.profile.structure().1
    }
    pub fn logical_record_id(&self) -> NodeId {
        NodeId::fixed(LOGICAL_RECORD)
    }
    pub fn segment_layout_id(&self) -> NodeId {
        NodeId::fixed(PHYSICAL_SEGMENT_LAYOUT)
    }

    /// The dataset-level nodes, in dependency order: structure, dataset, logical
    /// record, data store and the physical layer (data set, its structure, the
    /// segment layout and the record segment).
    pub fn nodes(&self) -> Vec<Node> {
        let (structure_kind, structure) = self.profile.structure();
        let (dataset_kind, dataset) = self.profile.dataset();
        let logical_record = self.logical_record_id();
        let data_store = NodeId::fixed(DATA_STORE);
        let physical_data_set = NodeId::fixed(PHYSICAL_DATA_SET);
        let segment_layout = self.segment_layout_id();
        let record_count = self.descriptor.record_count();

        let mut dataset_node = Node::new(dataset.clone(), dataset_kind)
            .with(
                "name",
                serde_json::json!({ "@type": "ObjectName", "name": self.descriptor.file_name() }),
            )
            .with("recordCount", record_count)
            .link("isStructuredBy", &structure);
        if !self.descriptor.dimensions().is_empty() {
            let dimensions: Vec<serde_json::Value> = self
                .descriptor
                .dimensions()
                .iter()
                .map(|d| serde_json::json!({ "name": d.name, "size": d.size }))
                .collect();
            dataset_node = dataset_node.with("dimensions", dimensions);
        }

        let (is_delimited, delimiter) = match self.profile.delimiter() {
            Some(delimiter) => (true, delimiter.to_owned()),
            None => (false, String::new()),
        };
        vec![
            Node::new(structure.clone(), structure_kind),
            dataset_node,
            Node::new(logical_record.clone(), NodeKind::LogicalRecord).link("organizes", &dataset),
            Node::new(data_store.clone(), NodeKind::DataStore)
                .with("allowsDuplicates", false)
                .with("recordCount", record_count)
                .links("has_LogicalRecord", std::slice::from_ref(&logical_record)),
            Node::new(physical_data_set.clone(), NodeKind::PhysicalDataSet)
                .with("allowsDuplicates", false)
                .with("physicalFileName", self.descriptor.file_name())
                .link("correspondsTo_DataSet", &dataset)
                .link("formats", &data_store),
            Node::new(NodeId::fixed(PHYSICAL_DATA_SET_STRUCTURE), NodeKind::PhysicalDataSetStructure)
                .link("correspondsTo_DataStructure", &structure)
                .link("structures", &physical_data_set),
            Node::new(segment_layout.clone(), NodeKind::PhysicalSegmentLayout)
                .with("allowsDuplicates", false)
                .with("isDelimited", is_delimited)
                .with("isFixedWidth", false)
                .with("delimiter", delimiter)
                .link("formats", &logical_record),
            Node::new(NodeId::fixed(PHYSICAL_RECORD_SEGMENT), NodeKind::PhysicalRecordSegment)
                .link("mapsTo", &logical_record)
                .link("has_PhysicalSegmentLayout", &segment_layout)
                .link("has_PhysicalRecordSegment_OF_PhysicalDataSet", &physical_data_set),
        ]
    }

    pub fn emit(&self, sink: &mut dyn NodeSink) -> Result<usize> {
        let nodes = self.nodes();
        let count = nodes.len();
        for node in nodes {
            sink.keep(node)?;
        }
        debug!(nodes = count, file = self.descriptor.file_name(), "emitted structural nodes");
        Ok(count)
    }

    /// Primary key components plus the primary key over every identifier, in
    /// declaration order. They reference identifier components, so they are
    /// appended once component emission is complete. Empty when the profile has
    /// no primary key or no variable is an identifier.
    pub fn primary_key(&self, roles: &[RoleSet]) -> Result<Vec<Node>> {
        if !self.profile.emits_primary_key() {
            return Ok(Vec::new());
        }
        let mut nodes = Vec::new();
        let mut key_components = Vec::new();
        for (variable, role_set) in self.descriptor.variables().iter().zip(roles) {
            if !role_set.is_identifier() {
                continue;
            }
            let identifier = self
                .profile
                .components(&RoleSet::wide(&[WideRole::Identifier]))?
                .into_iter()
                .next()
                .map(|spec| spec.id(variable.name()))
                .ok_or_else(|| ConversionError::Invariant("identifier role without a component".into()))?;
            let key_component = NodeId::of("primaryKeyComponent", variable.name());
            nodes.push(
                Node::new(key_component.clone(), NodeKind::PrimaryKeyComponent)
                    .link("correspondsTo_DataStructureComponent", &identifier),
            );
            key_components.push(key_component);
        }
        if key_components.is_empty() {
            return Ok(Vec::new());
        }
        nodes.push(
            Node::new(NodeId::fixed(PRIMARY_KEY), NodeKind::PrimaryKey)
                .links("isComposedOf", &key_components)
                .link("has_PrimaryKey_OF_DataStructure", &self.structure_id()),
        );
        Ok(nodes)
    }
}
