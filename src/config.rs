//! Generation settings.
//!
//! A [`GeneratorConfig`] is an immutable value handed to the [`crate::convert::Converter`].
//! It can be built in code (every field has a documented default) or loaded with
//! [`GeneratorConfig::load`], which layers an optional settings file under
//! `DDICDI_*` environment variables.

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{ConversionError, Result};
use crate::role::IdentifierPolicy;

pub const DEFAULT_MAX_ROWS_TO_PROCESS: usize = 5;
pub const DEFAULT_PREVIEW_ROWS: usize = 5;
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_MEMORY_CEILING_MB: usize = 500;
pub const DEFAULT_BYTES_PER_NODE: usize = 500;
pub const DEFAULT_MEMORY_SAFETY_FACTOR: f64 = 0.8;

const ENV_PREFIX: &str = "DDICDI";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Emit per-cell data points, positions and instance values.
    pub include_values: bool,
    /// Lift the row cap so every available record is emitted (in chunks).
    pub process_all_rows: bool,
    /// Row cap applied to value emission unless `process_all_rows` is set.
    pub max_rows_to_process: usize,
    /// Rows sampled by the role classifier when checking value uniqueness.
    pub preview_rows: usize,
    /// Upper bound for rows per chunk.
    pub chunk_size: usize,
    /// Target memory ceiling for one chunk, in megabytes.
    pub memory_ceiling_mb: usize,
    /// Estimated serialized size of one output node.
    pub bytes_per_node: usize,
    /// Share of the memory ceiling the scheduler is allowed to plan for.
    pub memory_safety_factor: f64,
    pub identifier_policy: IdentifierPolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            include_values: false,
            process_all_rows: false,
            max_rows_to_process: DEFAULT_MAX_ROWS_TO_PROCESS,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            memory_ceiling_mb: DEFAULT_MEMORY_CEILING_MB,
            bytes_per_node: DEFAULT_BYTES_PER_NODE,
            memory_safety_factor: DEFAULT_MEMORY_SAFETY_FACTOR,
            identifier_policy: IdentifierPolicy::default(),
        }
    }
}

impl GeneratorConfig {
    /// Loads settings from an optional file, then applies `DDICDI_*` environment
    /// overrides (for example `DDICDI_CHUNK_SIZE=1000`). Missing keys keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        let loaded: GeneratorConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ConversionError::Config("chunk_size must be at least 1".into()));
        }
        if self.bytes_per_node == 0 {
            return Err(ConversionError::Config("bytes_per_node must be at least 1".into()));
        }
        if !(self.memory_safety_factor > 0.0 && self.memory_safety_factor <= 1.0) {
            return Err(ConversionError::Config(format!(
                "memory_safety_factor must be in (0, 1], got {}",
                self.memory_safety_factor
            )));
        }
        Ok(())
    }

    /// The row cap that applies to value emission, `None` when all rows are requested.
    pub fn row_cap(&self) -> Option<usize> {
        if self.process_all_rows {
            None
        } else {
            Some(self.max_rows_to_process)
        }
    }

    /// `min(record_count, row cap, rows the accessor can serve)`.
    pub fn rows_to_process(&self, record_count: u64, available_rows: usize) -> usize {
        let declared = usize::try_from(record_count).unwrap_or(usize::MAX);
        let capped = match self.row_cap() {
            Some(cap) => declared.min(cap),
            None => declared,
        };
        capped.min(available_rows)
    }

    pub fn memory_ceiling_bytes(&self) -> u64 {
        (self.memory_ceiling_mb as u64).saturating_mul(1024 * 1024)
    }

    // builder style setters, handy for callers that do not use a settings file
    pub fn with_values(mut self, include_values: bool) -> Self {
        self.include_values = include_values;
        self
    }
    pub fn with_all_rows(mut self, process_all_rows: bool) -> Self {
        self.process_all_rows = process_all_rows;
        self
    }
    pub fn with_row_cap(mut self, max_rows_to_process: usize) -> Self {
        self.max_rows_to_process = max_rows_to_process;
        self
    }
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
    pub fn with_memory_ceiling_mb(mut self, memory_ceiling_mb: usize) -> Self {
        self.memory_ceiling_mb = memory_ceiling_mb;
        self
    }
    pub fn with_identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.identifier_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_cap_applies_unless_all_rows_requested() {
        let config = GeneratorConfig::default();
        assert_eq!(config.rows_to_process(884_736, usize::MAX), 5);
        assert_eq!(config.rows_to_process(3, usize::MAX), 3);
        let all = config.clone().with_all_rows(true);
        assert_eq!(all.rows_to_process(884_736, 1_000), 1_000);
        assert_eq!(all.rows_to_process(10, 1_000), 10);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let config = GeneratorConfig::default().with_chunk_size(0);
        assert!(config.validate().is_err());
    }
}
