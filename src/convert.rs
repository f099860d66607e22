//! The whole conversion, phase by phase.
//!
//! `Start → StructuralEmit → ComponentEmit → ValueEmit* → Done`. Value emission
//! only runs when values are requested, one chunk at a time. Any error aborts the
//! conversion and is reported with the phase it happened in; no graph is returned.

use tracing::{debug, info, warn};

use crate::component::ComponentGenerator;
use crate::config::GeneratorConfig;
use crate::descriptor::{Descriptor, RowSource};
use crate::domain::ValueDomains;
use crate::emitter::{EmissionStats, ValueEmitter};
use crate::error::{ConversionError, Phase, Result};
use crate::graph::{Graph, NodeSink};
use crate::role::{RoleClassifier, RoleSet};
use crate::scheduler::{Chunk, ChunkScheduler};
use crate::structure::StructuralBuilder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    pub node_count: usize,
    pub rows_processed: usize,
    pub chunks: Vec<Chunk>,
    pub sentinel_hits: usize,
    pub undetermined_cells: usize,
    pub fingerprint: String,
}

#[derive(Debug)]
pub struct Conversion {
    graph: Graph,
    report: ConversionReport,
}

impl Conversion {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }
    pub fn report(&self) -> &ConversionReport {
        &self.report
    }
    pub fn into_parts(self) -> (Graph, ConversionReport) {
        (self.graph, self.report)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Converter {
    config: GeneratorConfig,
}

impl Converter {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Builds the complete graph in memory.
    pub fn convert(&self, descriptor: &Descriptor, rows: &dyn RowSource) -> Result<Conversion> {
        let mut graph = Graph::new();
        let report = self.convert_into(descriptor, rows, &mut graph)?;
        Ok(Conversion { graph, report })
    }

    /// Streams the conversion into any sink. On error the sink holds a partial
    /// graph that must be discarded.
    pub fn convert_into(
        &self,
        descriptor: &Descriptor,
        rows: &dyn RowSource,
        sink: &mut dyn NodeSink,
    ) -> Result<ConversionReport> {
        let mut phase = Phase::Start;
        let result = self.run(descriptor, rows, sink, &mut phase);
        result.map_err(|e| {
            warn!(phase = %phase, error = %e, "conversion aborted");
            e.in_phase(phase)
        })
    }

    fn run(
        &self,
        descriptor: &Descriptor,
        rows: &dyn RowSource,
        sink: &mut dyn NodeSink,
        phase: &mut Phase,
    ) -> Result<ConversionReport> {
        info!(
            file = descriptor.file_name(),
            format = %descriptor.format(),
            variables = descriptor.width(),
            record_count = descriptor.record_count(),
            include_values = self.config.include_values,
            "starting conversion"
        );
        if !sink.is_empty() {
            return Err(ConversionError::Invariant("conversion needs an empty sink".into()));
        }
        // everything that can reject the descriptor happens before the first node
        let roles: Vec<RoleSet> = RoleClassifier::new(self.config.identifier_policy).classify_all(
            descriptor,
            rows,
            self.config.preview_rows,
        )?;
        if let Some((variable, _)) = descriptor.variables().iter().zip(&roles).find(|(_, r)| r.is_empty()) {
            return Err(ConversionError::EmptyRoleSet { variable: variable.name().to_owned() });
        }
        let domains: Vec<ValueDomains> = descriptor
            .variables()
            .iter()
            .map(ValueDomains::build)
            .collect::<Result<_>>()?;

        *phase = Phase::StructuralEmit;
        let structural = StructuralBuilder::new(descriptor);
        structural.emit(sink)?;

        *phase = Phase::ComponentEmit;
        let generator = ComponentGenerator::new(
            structural.profile(),
            structural.logical_record_id(),
            structural.segment_layout_id(),
        );
        generator.emit(descriptor, &roles, &domains, sink)?;
        let primary_key = structural.primary_key(&roles)?;
        debug!(nodes = primary_key.len(), "primary key");
        for node in primary_key {
            sink.keep(node)?;
        }

        let mut stats = EmissionStats::default();
        let mut chunks = Vec::new();
        if self.config.include_values {
            *phase = Phase::ValueEmit;
            let rows_to_process = self.config.rows_to_process(descriptor.record_count(), rows.row_count());
            let wanted = self.config.rows_to_process(descriptor.record_count(), usize::MAX);
            if rows_to_process < wanted {
                warn!(wanted, available = rows.row_count(), "row source holds fewer rows than requested");
            }
            chunks = ChunkScheduler::from_config(&self.config).plan(rows_to_process, descriptor.width());
            let emitter = ValueEmitter::new(descriptor, &domains, structural.dataset_id());
            for (index, chunk) in chunks.iter().enumerate() {
                debug!(chunk = index + 1, of = chunks.len(), start = chunk.start(), end = chunk.end(), "emitting values");
                stats += emitter.emit_chunk(*chunk, rows, sink)?;
            }
        }

        *phase = Phase::Done;
        let report = ConversionReport {
            node_count: sink.len(),
            rows_processed: stats.rows,
            chunks,
            sentinel_hits: stats.sentinel_hits,
            undetermined_cells: stats.undetermined,
            fingerprint: sink.fingerprint()?,
        };
        info!(
            nodes = report.node_count,
            rows = report.rows_processed,
            sentinel_hits = report.sentinel_hits,
            undetermined = report.undetermined_cells,
            "conversion done"
        );
        Ok(report)
    }
}
