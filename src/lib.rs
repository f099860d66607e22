//! ddicdi – generates DDI-CDI linked-data metadata graphs for tabular and key-value datasets.
//!
//! A conversion takes a [`descriptor::Descriptor`] (the variable-level description
//! of a source file, produced by a format reader) plus a [`descriptor::RowSource`]
//! and emits a forward-reference-free sequence of typed nodes:
//! * dataset-level nodes, once ([`structure`]),
//! * per variable: value domains, value mapping, instance variable, role
//!   components and their positions ([`domain`], [`component`]),
//! * optionally, per cell of a bounded number of rows: data point, its position
//!   and the instance value stored in it ([`emitter`]), chunked by the [`scheduler`].
//!
//! Nodes are appended to a [`graph::NodeSink`]; the in-memory [`graph::Graph`]
//! keeps them (deduplicated, shared through `Arc`) and renders the JSON-LD
//! document, while [`graph::NdjsonSink`] streams them one per line.
//!
//! ## Quick Start
//! ```
//! use ddicdi::config::GeneratorConfig;
//! use ddicdi::convert::Converter;
//! use ddicdi::descriptor::{Descriptor, InMemoryRows, SourceFormat, Variable};
//! use ddicdi::graph::NodeKind;
//!
//! let descriptor = Descriptor::new(
//!     "survey.csv",
//!     SourceFormat::delimited(","),
//!     vec![
//!         Variable::new("respondent_id", "int64").with_roles(&["identifier"]),
//!         Variable::new("age", "int32").with_roles(&["measure"]),
//!     ],
//!     1200,
//! ).unwrap();
//! let converter = Converter::new(GeneratorConfig::default()).unwrap();
//! let conversion = converter.convert(&descriptor, &InMemoryRows::empty(2)).unwrap();
//! assert_eq!(conversion.graph().count(NodeKind::InstanceVariable), 2);
//! assert_eq!(conversion.graph().count(NodeKind::PrimaryKey), 1);
//! ```

pub mod component;
pub mod config;
pub mod convert;
pub mod datatype;
pub mod descriptor;
pub mod domain;
pub mod emitter;
pub mod error;
pub mod graph;
pub mod role;
pub mod scheduler;
pub mod structure;
