//! Chunk planning for value emission.
//!
//! The planner only looks at configured numbers (row width, memory ceiling,
//! chunk size); it never inspects live process memory, so the same inputs always
//! give the same partition.

use std::fmt;
use std::ops::Range;

use tracing::{debug, warn};

use crate::config::{GeneratorConfig, DEFAULT_BYTES_PER_NODE, DEFAULT_MEMORY_SAFETY_FACTOR};

/// Every emitted cell becomes a position, an instance value and a data point.
pub const NODES_PER_CELL: u64 = 3;

// ------------- Chunk -------------
/// A half-open row range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Chunk {
    start: usize,
    end: usize,
}

impl Chunk {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end: end.max(start) }
    }
    pub fn start(&self) -> usize {
        self.start
    }
    pub fn end(&self) -> usize {
        self.end
    }
    pub fn len(&self) -> usize {
        self.end - self.start
    }
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ------------- Estimation -------------
/// Estimated bytes needed to hold the output of one source row.
pub trait MemoryEstimator {
    /// `None` when no positive estimate can be made.
    fn row_cost(&self, row_width: usize) -> Option<u64>;
}

/// Counts output nodes and charges a flat size for each of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeCountEstimator {
    bytes_per_node: u64,
}

impl NodeCountEstimator {
    pub fn new(bytes_per_node: u64) -> Self {
        Self { bytes_per_node }
    }
}

impl Default for NodeCountEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_BYTES_PER_NODE as u64)
    }
}

impl MemoryEstimator for NodeCountEstimator {
    fn row_cost(&self, row_width: usize) -> Option<u64> {
        (row_width as u64)
            .checked_mul(NODES_PER_CELL)
            .and_then(|nodes| nodes.checked_mul(self.bytes_per_node))
            .filter(|cost| *cost > 0)
    }
}

// ------------- Scheduler -------------
#[derive(Debug, Clone)]
pub struct ChunkScheduler<E: MemoryEstimator = NodeCountEstimator> {
    estimator: E,
    memory_ceiling: u64,
    safety_factor: f64,
    chunk_size: usize,
}

impl ChunkScheduler<NodeCountEstimator> {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::with_estimator(
            NodeCountEstimator::new(config.bytes_per_node as u64),
            config.memory_ceiling_bytes(),
            config.memory_safety_factor,
            config.chunk_size,
        )
    }
}

impl<E: MemoryEstimator> ChunkScheduler<E> {
    pub fn with_estimator(estimator: E, memory_ceiling: u64, safety_factor: f64, chunk_size: usize) -> Self {
        Self {
            estimator,
            memory_ceiling,
            safety_factor,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Largest number of rows whose output fits in the usable part of the
    /// ceiling, clamped to `[1, chunk_size]`. Falls back to `chunk_size` when the
    /// estimator or the ceiling give nothing to work with.
    pub fn rows_per_chunk(&self, row_width: usize) -> usize {
        let budget = (self.memory_ceiling as f64 * self.safety_factor).floor();
        match self.estimator.row_cost(row_width) {
            Some(cost) if budget >= 1.0 => {
                let fitting = (budget / cost as f64).floor() as usize;
                fitting.clamp(1, self.chunk_size)
            }
            _ => {
                warn!(
                    row_width,
                    memory_ceiling = self.memory_ceiling,
                    fallback = self.chunk_size,
                    "no usable memory estimate, using configured chunk size"
                );
                self.chunk_size
            }
        }
    }

    /// Contiguous, ordered, non-overlapping chunks covering `[0, row_count)`.
    pub fn plan(&self, row_count: usize, row_width: usize) -> Vec<Chunk> {
        if row_count == 0 {
            return Vec::new();
        }
        let step = self.rows_per_chunk(row_width);
        let chunks: Vec<Chunk> = (0..row_count)
            .step_by(step)
            .map(|start| Chunk::new(start, (start + step).min(row_count)))
            .collect();
        debug!(row_count, row_width, rows_per_chunk = step, chunks = chunks.len(), "planned chunks");
        chunks
    }
}

/// Plans with the default node-count estimate and safety factor.
pub fn plan(row_count: usize, row_width: usize, memory_ceiling: u64, configured_chunk_size: usize) -> Vec<Chunk> {
    ChunkScheduler::with_estimator(
        NodeCountEstimator::default(),
        memory_ceiling,
        DEFAULT_MEMORY_SAFETY_FACTOR,
        configured_chunk_size,
    )
    .plan(row_count, row_width)
}
