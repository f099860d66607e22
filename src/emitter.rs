//! Per-cell value emission for one chunk at a time.
//!
//! Each cell yields, in this order, a data point (described by its instance
//! variable, part of the dataset), the position that indexes it and the instance
//! value stored in it. Cells are visited row-major, columns in declaration order.
//! Every node of a cell is a pure function of (row, column, cell), so emitting an
//! overlapping range again only re-keeps identical nodes.

use std::ops::AddAssign;

use tracing::{trace, warn};

use crate::component::instance_variable_id;
use crate::descriptor::{Cell, Descriptor, RowSource};
use crate::domain::{Resolution, ValueDomains};
use crate::error::{ConversionError, Result};
use crate::graph::{Node, NodeId, NodeKind, NodeSink};
use crate::scheduler::Chunk;
use crate::structure::PHYSICAL_RECORD_SEGMENT;

/// Stands in for the value domain of a cell that matches neither domain.
pub const UNDETERMINED: &str = "undetermined";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmissionStats {
    pub rows: usize,
    pub cells: usize,
    pub sentinel_hits: usize,
    pub undetermined: usize,
}

impl AddAssign for EmissionStats {
    fn add_assign(&mut self, other: Self) {
        self.rows += other.rows;
        self.cells += other.cells;
        self.sentinel_hits += other.sentinel_hits;
        self.undetermined += other.undetermined;
    }
}

pub struct ValueEmitter<'a> {
    descriptor: &'a Descriptor,
    domains: &'a [ValueDomains],
    dataset: NodeId,
    record_segment: NodeId,
}

impl<'a> ValueEmitter<'a> {
    pub fn new(descriptor: &'a Descriptor, domains: &'a [ValueDomains], dataset: NodeId) -> Self {
        Self {
            descriptor,
            domains,
            dataset,
            record_segment: NodeId::fixed(PHYSICAL_RECORD_SEGMENT),
        }
    }

    /// The three nodes for one cell, together with how its value was resolved.
    pub fn cell_nodes(&self, row: usize, column: usize, cell: &Cell) -> Result<([Node; 3], Resolution)> {
        let domains = self.domains.get(column).ok_or_else(|| {
            ConversionError::Invariant(format!("no value domains for column {}", column))
        })?;
        let name = domains.variable();
        let resolution = domains.resolve(cell);

        let position = NodeId::cell("dataPointPosition", row, name);
        let value = NodeId::cell("instanceValue", row, name);
        let point = NodeId::cell("dataPoint", row, name);

        let point_node = Node::new(point.clone(), NodeKind::DataPoint)
            .link("isDescribedBy", &instance_variable_id(name))
            .link("has_DataPoint_OF_DataSet", &self.dataset);
        let position_node = Node::new(position, NodeKind::DataPointPosition)
            .with("value", row)
            .with("columnIndex", column)
            .link("indexes", &point)
            .link("has_DataPointPosition_OF_PhysicalRecordSegment", &self.record_segment);
        let value_node = Node::new(value, NodeKind::InstanceValue)
            .typed_string("content", &cell.to_string())
            .link("isStoredIn", &point);
        let value_node = match domains.domain_for(&resolution) {
            Some(domain) => value_node.link("hasValueFrom_ValueDomain", domain),
            None => value_node.with("hasValueFrom_ValueDomain", UNDETERMINED),
        };
        Ok(([point_node, position_node, value_node], resolution))
    }

    /// Reads the chunk's rows once and appends every cell's nodes to the sink.
    pub fn emit_chunk(&self, chunk: Chunk, rows: &dyn RowSource, sink: &mut dyn NodeSink) -> Result<EmissionStats> {
        let cells = rows.read_rows(chunk.range(), None)?;
        if cells.len() != chunk.len() {
            return Err(ConversionError::RowAccess(format!(
                "chunk {} returned {} rows",
                chunk,
                cells.len()
            )));
        }
        let width = self.descriptor.width();
        let mut stats = EmissionStats::default();
        for (offset, row) in cells.iter().enumerate() {
            let row_index = chunk.start() + offset;
            if row.len() != width {
                return Err(ConversionError::RowAccess(format!(
                    "row {} has {} cells, expected {}",
                    row_index,
                    row.len(),
                    width
                )));
            }
            for (column, cell) in row.iter().enumerate() {
                let (nodes, resolution) = self.cell_nodes(row_index, column, cell)?;
                match resolution {
                    Resolution::Sentinel => stats.sentinel_hits += 1,
                    Resolution::Undetermined => {
                        stats.undetermined += 1;
                        warn!(
                            variable = self.descriptor.name_at(column).unwrap_or_default(),
                            row = row_index,
                            value = %cell,
                            "value matches neither the substantive nor the sentinel domain"
                        );
                    }
                    Resolution::Substantive => (),
                }
                for node in nodes {
                    sink.keep(node)?;
                }
                stats.cells += 1;
            }
            stats.rows += 1;
        }
        trace!(%chunk, cells = stats.cells, "emitted chunk");
        Ok(stats)
    }
}
