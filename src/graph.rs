//! The output graph: an append-only sequence of typed, cross-referenced nodes.
//!
//! Every node may only reference nodes that were appended before it. Appending a
//! node whose identifier is already kept is fine as long as the node is identical;
//! anything else is an internal invariant violation.

use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::io::Write;
use std::sync::Arc;

// we will use a fast hashing algo for the node index
use seahash::SeaHasher;
use serde_json::{json, Map, Value};

use crate::error::{ConversionError, Result};

pub const DDI_CDI_CONTEXT: &str =
    "https://docs.ddialliance.org/DDI-CDI/1.0/model/encoding/json-ld/ddi-cdi.jsonld";
pub const SKOS_NAMESPACE: &str = "http://www.w3.org/2004/02/skos/core#";
pub const MODELS_KEY: &str = "DDICDIModels";

pub type NodeHasher = BuildHasherDefault<SeaHasher>;

// ------------- NodeId -------------
/// A local, human readable node identifier such as `#instanceVariable-age`.
/// Variable names and codes are percent-encoded where they contain characters
/// outside `[A-Za-z0-9_.~-]`, so distinct names never share an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// A dataset-level node, e.g. `#logicalRecord`.
    pub fn fixed(name: &str) -> Self {
        NodeId(format!("#{}", name))
    }
    /// A per-variable node, e.g. `#substantiveValueDomain-age`.
    pub fn of(prefix: &str, variable: &str) -> Self {
        NodeId(format!("#{}-{}", prefix, encode(variable)))
    }
    /// A per-cell node, e.g. `#dataPoint-3-age`.
    pub fn cell(prefix: &str, row: usize, variable: &str) -> Self {
        NodeId(format!("#{}-{}-{}", prefix, row, encode(variable)))
    }
    /// A labelled code, e.g. `#concept-sex--9`. The variable part has its `-`
    /// encoded as well, so the first `-` after it always starts the code.
    pub fn concept(variable: &str, code: &str) -> Self {
        NodeId(format!("#concept-{}-{}", encode(variable).replace('-', "%2D"), encode(code)))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn encode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '~') {
            encoded.push(c);
        } else {
            let mut buffer = [0u8; 4];
            for byte in c.encode_utf8(&mut buffer).bytes() {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    encoded
}

// ------------- NodeKind -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    WideDataSet,
    DimensionalDataSet,
    KeyValueDataStore,
    DataStore,
    LogicalRecord,
    WideDataStructure,
    DimensionalDataStructure,
    KeyValueStructure,
    PhysicalDataSet,
    PhysicalDataSetStructure,
    PhysicalRecordSegment,
    PhysicalSegmentLayout,
    PrimaryKey,
    PrimaryKeyComponent,
    InstanceVariable,
    ValueMapping,
    ValueMappingPosition,
    SubstantiveValueDomain,
    SentinelValueDomain,
    ValueAndConceptDescription,
    EnumerationDomain,
    ConceptScheme,
    Concept,
    ComponentPosition,
    IdentifierComponent,
    DimensionComponent,
    MeasureComponent,
    AttributeComponent,
    ContextualComponent,
    SyntheticIdComponent,
    VariableValueComponent,
    VariableDescriptorComponent,
    DataPoint,
    DataPointPosition,
    InstanceValue,
}

impl NodeKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            NodeKind::WideDataSet => "WideDataSet",
            NodeKind::DimensionalDataSet => "DimensionalDataSet",
            NodeKind::KeyValueDataStore => "KeyValueDataStore",
            NodeKind::DataStore => "DataStore",
            NodeKind::LogicalRecord => "LogicalRecord",
            NodeKind::WideDataStructure => "WideDataStructure",
            NodeKind::DimensionalDataStructure => "DimensionalDataStructure",
            NodeKind::KeyValueStructure => "KeyValueStructure",
            NodeKind::PhysicalDataSet => "PhysicalDataSet",
            NodeKind::PhysicalDataSetStructure => "PhysicalDataSetStructure",
            NodeKind::PhysicalRecordSegment => "PhysicalRecordSegment",
            NodeKind::PhysicalSegmentLayout => "PhysicalSegmentLayout",
            NodeKind::PrimaryKey => "PrimaryKey",
            NodeKind::PrimaryKeyComponent => "PrimaryKeyComponent",
            NodeKind::InstanceVariable => "InstanceVariable",
            NodeKind::ValueMapping => "ValueMapping",
            NodeKind::ValueMappingPosition => "ValueMappingPosition",
            NodeKind::SubstantiveValueDomain => "SubstantiveValueDomain",
            NodeKind::SentinelValueDomain => "SentinelValueDomain",
            NodeKind::ValueAndConceptDescription => "ValueAndConceptDescription",
            NodeKind::EnumerationDomain => "EnumerationDomain",
            NodeKind::ConceptScheme => "skos:ConceptScheme",
            NodeKind::Concept => "skos:Concept",
            NodeKind::ComponentPosition => "ComponentPosition",
            NodeKind::IdentifierComponent => "IdentifierComponent",
            NodeKind::DimensionComponent => "DimensionComponent",
            NodeKind::MeasureComponent => "MeasureComponent",
            NodeKind::AttributeComponent => "AttributeComponent",
            NodeKind::ContextualComponent => "ContextualComponent",
            NodeKind::SyntheticIdComponent => "SyntheticIdComponent",
            NodeKind::VariableValueComponent => "VariableValueComponent",
            NodeKind::VariableDescriptorComponent => "VariableDescriptorComponent",
            NodeKind::DataPoint => "DataPoint",
            NodeKind::DataPointPosition => "DataPointPosition",
            NodeKind::InstanceValue => "InstanceValue",
        }
    }
    pub fn is_component(&self) -> bool {
        matches!(
            self,
            NodeKind::IdentifierComponent
                | NodeKind::DimensionComponent
                | NodeKind::MeasureComponent
                | NodeKind::AttributeComponent
                | NodeKind::ContextualComponent
                | NodeKind::SyntheticIdComponent
                | NodeKind::VariableValueComponent
                | NodeKind::VariableDescriptorComponent
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_tag())
    }
}

// ------------- Node -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    properties: Map<String, Value>,
    references: Vec<NodeId>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            properties: Map::new(),
            references: Vec::new(),
        }
    }
    /// A literal property.
    pub fn with(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(property.to_owned(), value.into());
        self
    }
    /// A reference to an earlier node.
    pub fn link(mut self, property: &str, target: &NodeId) -> Self {
        self.properties.insert(property.to_owned(), Value::String(target.to_string()));
        self.references.push(target.clone());
        self
    }
    pub fn links(mut self, property: &str, targets: &[NodeId]) -> Self {
        let values = targets.iter().map(|t| Value::String(t.to_string())).collect();
        self.properties.insert(property.to_owned(), Value::Array(values));
        self.references.extend(targets.iter().cloned());
        self
    }
    pub fn typed_string(self, property: &str, content: &str) -> Self {
        self.with(property, json!({ "@type": "TypedString", "content": content }))
    }
    pub fn vocabulary_entry(self, property: &str, entry: &str) -> Self {
        self.with(property, json!({ "@type": "ControlledVocabularyEntry", "entryValue": entry }))
    }
    pub fn id(&self) -> &NodeId {
        &self.id
    }
    pub fn kind(&self) -> NodeKind {
        self.kind
    }
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
    pub fn references(&self) -> &[NodeId] {
        &self.references
    }
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("@id".to_owned(), Value::String(self.id.to_string()));
        object.insert("@type".to_owned(), Value::String(self.kind.type_tag().to_owned()));
        for (key, value) in &self.properties {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
    fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(&self.to_json())?;
        line.push('\n');
        Ok(line)
    }
}

// ------------- Sinks -------------
/// Write-only append interface the generators emit into.
pub trait NodeSink {
    /// Appends a node, returning whether an identical node had already been kept.
    fn keep(&mut self, node: Node) -> Result<bool>;
    fn contains(&self, id: &NodeId) -> bool;
    fn len(&self) -> usize;
    /// Digest of everything kept so far, in order.
    fn fingerprint(&self) -> Result<String>;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_references(node: &Node, contains: impl Fn(&NodeId) -> bool) -> Result<()> {
    match node.references().iter().find(|r| !contains(r)) {
        Some(missing) => Err(ConversionError::Invariant(format!(
            "{} references {} before it was emitted",
            node.id(),
            missing
        ))),
        None => Ok(()),
    }
}

fn conflicting(id: &NodeId) -> ConversionError {
    ConversionError::Invariant(format!("{} was emitted twice with different content", id))
}

/// The in-memory graph handed to callers when a conversion completes.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Arc<Node>>,
    index: HashMap<NodeId, usize, NodeHasher>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::default(),
        }
    }
    pub fn keep_node(&mut self, node: Node) -> Result<(Arc<Node>, bool)> {
        if let Some(&position) = self.index.get(node.id()) {
            let kept = &self.nodes[position];
            if **kept != node {
                return Err(conflicting(node.id()));
            }
            return Ok((Arc::clone(kept), true));
        }
        check_references(&node, |r| self.index.contains_key(r))?;
        let kept = Arc::new(node);
        self.index.insert(kept.id().clone(), self.nodes.len());
        self.nodes.push(Arc::clone(&kept));
        Ok((kept, false))
    }
    pub fn get(&self, id: &NodeId) -> Option<Arc<Node>> {
        self.index.get(id).map(|&i| Arc::clone(&self.nodes[i]))
    }
    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }
    pub fn of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.iter().filter(move |n| n.kind() == kind)
    }
    pub fn count(&self, kind: NodeKind) -> usize {
        self.of_kind(kind).count()
    }
    /// The JSON-LD document: a fixed context and a top-level array of nodes.
    pub fn to_document(&self) -> Value {
        let models: Vec<Value> = self.nodes.iter().map(|n| n.to_json()).collect();
        json!({
            "@context": [DDI_CDI_CONTEXT, { "skos": SKOS_NAMESPACE }],
            MODELS_KEY: models,
        })
    }
    pub fn write_document<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, &self.to_document())?;
        Ok(())
    }
}

impl NodeSink for Graph {
    fn keep(&mut self, node: Node) -> Result<bool> {
        self.keep_node(node).map(|(_, previously_kept)| previously_kept)
    }
    fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }
    fn len(&self) -> usize {
        self.nodes.len()
    }
    /// Digest over the serialized nodes in order. Equal graphs have equal fingerprints,
    /// and it matches the fingerprint of an [`NdjsonSink`] fed the same nodes.
    fn fingerprint(&self) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        for node in &self.nodes {
            hasher.update(node.to_line()?.as_bytes());
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

/// Streams one node per line instead of accumulating them. Only a digest per
/// identifier is retained, which is enough to enforce the ordering rules.
pub struct NdjsonSink<W: Write> {
    writer: W,
    seen: HashMap<NodeId, blake3::Hash, NodeHasher>,
    hasher: blake3::Hasher,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            seen: HashMap::default(),
            hasher: blake3::Hasher::new(),
        }
    }
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> NodeSink for NdjsonSink<W> {
    fn keep(&mut self, node: Node) -> Result<bool> {
        let line = node.to_line()?;
        let digest = blake3::hash(line.as_bytes());
        if let Some(kept) = self.seen.get(node.id()) {
            if *kept != digest {
                return Err(conflicting(node.id()));
            }
            return Ok(true);
        }
        check_references(&node, |r| self.seen.contains_key(r))?;
        self.writer.write_all(line.as_bytes())?;
        self.hasher.update(line.as_bytes());
        self.seen.insert(node.id().clone(), digest);
        Ok(false)
    }
    fn contains(&self, id: &NodeId) -> bool {
        self.seen.contains_key(id)
    }
    fn len(&self) -> usize {
        self.seen.len()
    }
    fn fingerprint(&self) -> Result<String> {
        Ok(self.hasher.finalize().to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_encoded() {
        assert_eq!(NodeId::of("instanceVariable", "age").as_str(), "#instanceVariable-age");
        assert_eq!(NodeId::of("instanceVariable", "key-1").as_str(), "#instanceVariable-key-1");
        assert_eq!(NodeId::of("instanceVariable", "a b").as_str(), "#instanceVariable-a%20b");
        assert_ne!(NodeId::of("x", "a%20b"), NodeId::of("x", "a b"));
        assert_eq!(NodeId::cell("dataPoint", 3, "tas").as_str(), "#dataPoint-3-tas");
    }

    #[test]
    fn concept_identifiers_stay_apart_from_variable_identifiers() {
        assert_eq!(NodeId::concept("sex", "-9").as_str(), "#concept-sex--9");
        assert_eq!(NodeId::concept("key-1", "a").as_str(), "#concept-key%2D1-a");
        assert_ne!(NodeId::concept("a-b", "c"), NodeId::concept("a", "b-c"));
        assert_ne!(NodeId::concept("instanceVariable", "x"), NodeId::of("instanceVariable", "concept-x"));
    }

    #[test]
    fn forward_references_are_rejected() {
        let mut graph = Graph::new();
        let dataset = NodeId::fixed("wideDataSet");
        let store = Node::new(NodeId::fixed("dataStore"), NodeKind::DataStore).link("organizes", &dataset);
        assert!(matches!(graph.keep(store.clone()), Err(ConversionError::Invariant(_))));
        graph.keep(Node::new(dataset, NodeKind::WideDataSet)).expect("dataset");
        assert!(!graph.keep(store.clone()).expect("store"));
        assert!(graph.keep(store).expect("again"));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn conflicting_duplicates_are_rejected() {
        let mut graph = Graph::new();
        let id = NodeId::fixed("dataStore");
        graph.keep(Node::new(id.clone(), NodeKind::DataStore).with("recordCount", 3)).expect("first");
        assert!(graph.keep(Node::new(id, NodeKind::DataStore).with("recordCount", 4)).is_err());
    }

    #[test]
    fn ndjson_sink_matches_graph_fingerprint() {
        let nodes = vec![
            Node::new(NodeId::fixed("wideDataSet"), NodeKind::WideDataSet),
            Node::new(NodeId::fixed("dataStore"), NodeKind::DataStore)
                .with("recordCount", 10)
                .link("organizes", &NodeId::fixed("wideDataSet")),
        ];
        let mut graph = Graph::new();
        let mut sink = NdjsonSink::new(Vec::new());
        for node in nodes {
            graph.keep(node.clone()).expect("graph");
            sink.keep(node).expect("sink");
        }
        assert_eq!(
            graph.fingerprint().expect("graph fingerprint"),
            sink.fingerprint().expect("sink fingerprint")
        );
        let written = String::from_utf8(sink.into_inner().expect("flush")).expect("utf8");
        assert_eq!(written.lines().count(), 2);
        assert!(written.starts_with(r##"{"@id":"#wideDataSet","@type":"WideDataSet"}"##));
    }
}
