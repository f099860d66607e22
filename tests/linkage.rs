use ddicdi::config::GeneratorConfig;
use ddicdi::convert::Converter;
use ddicdi::descriptor::{Cell, Descriptor, InMemoryRows, MissingValues, SourceFormat, Variable};
use ddicdi::domain::ValueDomains;
use ddicdi::emitter::ValueEmitter;
use ddicdi::error::Result;
use ddicdi::graph::{Graph, NodeId, NodeKind, NodeSink};
use ddicdi::scheduler::Chunk;
use serde_json::json;

fn household() -> (Descriptor, InMemoryRows) {
    let descriptor = Descriptor::new(
        "household.csv",
        SourceFormat::delimited(","),
        vec![
            Variable::new("household", "int64").with_roles(&["identifier"]),
            Variable::new("tenure", "int8")
                .with_value_label(1i64, "Owned")
                .with_value_label(2i64, "Rented")
                .with_value_label(-1i64, "Unknown")
                .with_missing(MissingValues::Codes(vec![Cell::Integer(-1)])),
            Variable::new("rent", "float64").with_roles(&["measure", "attribute"]),
        ],
        4,
    )
    .expect("descriptor");
    let rows = (0..4)
        .map(|i| {
            vec![
                Cell::Integer(10 + i),
                Cell::Integer(if i == 2 { -1 } else { 1 + i % 2 }),
                Cell::Float(650.0 + 10.0 * i as f64),
            ]
        })
        .collect();
    (descriptor, InMemoryRows::new(3, rows).expect("rows"))
}

fn convert(config: GeneratorConfig) -> Graph {
    let (descriptor, rows) = household();
    let converter = Converter::new(config).expect("converter");
    converter.convert(&descriptor, &rows).expect("conversion").into_parts().0
}

fn links_to(graph: &Graph, id: &NodeId, property: &str) -> serde_json::Value {
    graph
        .get(id)
        .unwrap_or_else(|| panic!("{} missing", id))
        .property(property)
        .cloned()
        .unwrap_or_default()
}

#[test]
fn components_and_variables_belong_to_the_structure() {
    let graph = convert(GeneratorConfig::default());
    let structure = NodeId::fixed("wideDataStructure");
    let logical_record = NodeId::fixed("logicalRecord");

    let components: Vec<_> = graph.nodes().iter().filter(|n| n.kind().is_component()).collect();
    assert_eq!(components.len(), 4);
    for component in components {
        assert!(
            component.references().contains(&structure),
            "{} is not part of the structure",
            component.id()
        );
    }
    assert_eq!(graph.count(NodeKind::ComponentPosition), 3);
    for position in graph.of_kind(NodeKind::ComponentPosition) {
        assert!(position.references().contains(&structure), "{} is unowned", position.id());
    }
    assert_eq!(graph.count(NodeKind::InstanceVariable), 3);
    for variable in graph.of_kind(NodeKind::InstanceVariable) {
        assert!(
            variable.references().contains(&logical_record),
            "{} is not in the logical record",
            variable.id()
        );
    }
    assert_eq!(
        links_to(&graph, &NodeId::fixed("primaryKey"), "has_PrimaryKey_OF_DataStructure"),
        json!("#wideDataStructure")
    );
}

#[test]
fn physical_layer_is_wired_to_the_dataset() {
    let graph = convert(GeneratorConfig::default());
    assert_eq!(
        links_to(&graph, &NodeId::fixed("physicalDataSet"), "correspondsTo_DataSet"),
        json!("#wideDataSet")
    );
    let structure = NodeId::fixed("physicalDataSetStructure");
    assert_eq!(links_to(&graph, &structure, "correspondsTo_DataStructure"), json!("#wideDataStructure"));
    assert_eq!(links_to(&graph, &structure, "structures"), json!("#physicalDataSet"));
    let segment = NodeId::fixed("physicalRecordSegment");
    assert_eq!(links_to(&graph, &segment, "mapsTo"), json!("#logicalRecord"));
    assert_eq!(links_to(&graph, &segment, "has_PhysicalSegmentLayout"), json!("#physicalSegmentLayout"));
    assert_eq!(
        links_to(&graph, &segment, "has_PhysicalRecordSegment_OF_PhysicalDataSet"),
        json!("#physicalDataSet")
    );
    assert_eq!(graph.count(NodeKind::PhysicalDataSetStructure), 1);
    assert_eq!(graph.count(NodeKind::PhysicalRecordSegment), 1);
}

#[test]
fn every_variable_has_a_value_mapping_in_the_layout() {
    let graph = convert(GeneratorConfig::default());
    assert_eq!(graph.count(NodeKind::ValueMapping), 3);
    let positions: Vec<(String, serde_json::Value)> = graph
        .of_kind(NodeKind::ValueMappingPosition)
        .map(|n| {
            assert_eq!(
                n.property("has_ValueMappingPosition_OF_PhysicalSegmentLayout"),
                Some(&json!("#physicalSegmentLayout"))
            );
            (
                n.property("indexes").cloned().unwrap_or_default().to_string(),
                n.property("value").cloned().unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(
        positions,
        vec![
            ("\"#valueMapping-household\"".to_string(), json!(0)),
            ("\"#valueMapping-tenure\"".to_string(), json!(1)),
            ("\"#valueMapping-rent\"".to_string(), json!(2)),
        ]
    );
    assert_eq!(
        links_to(&graph, &NodeId::of("instanceVariable", "rent"), "has_ValueMapping"),
        json!("#valueMapping-rent")
    );
}

#[test]
fn cells_hang_off_their_data_point() {
    let graph = convert(GeneratorConfig::default().with_values(true).with_all_rows(true));
    let point = NodeId::cell("dataPoint", 2, "tenure");
    assert_eq!(links_to(&graph, &point, "isDescribedBy"), json!("#instanceVariable-tenure"));
    assert_eq!(links_to(&graph, &point, "has_DataPoint_OF_DataSet"), json!("#wideDataSet"));

    let position = NodeId::cell("dataPointPosition", 2, "tenure");
    assert_eq!(links_to(&graph, &position, "indexes"), json!("#dataPoint-2-tenure"));
    assert_eq!(
        links_to(&graph, &position, "has_DataPointPosition_OF_PhysicalRecordSegment"),
        json!("#physicalRecordSegment")
    );

    let value = NodeId::cell("instanceValue", 2, "tenure");
    assert_eq!(links_to(&graph, &value, "isStoredIn"), json!("#dataPoint-2-tenure"));
    assert_eq!(links_to(&graph, &value, "hasValueFrom_ValueDomain"), json!("#sentinelValueDomain-tenure"));
    assert!(graph.position(&point) < graph.position(&position));
    assert!(graph.position(&position) < graph.position(&value));
}

#[test]
fn overlapping_chunks_do_not_duplicate_cells() -> Result<()> {
    let (descriptor, rows) = household();
    let converter = Converter::new(GeneratorConfig::default())?;
    let mut graph = converter.convert(&descriptor, &rows)?.into_parts().0;
    let metadata = graph.len();

    let domains = descriptor
        .variables()
        .iter()
        .map(ValueDomains::build)
        .collect::<Result<Vec<_>>>()?;
    let emitter = ValueEmitter::new(&descriptor, &domains, NodeId::fixed("wideDataSet"));
    let first = emitter.emit_chunk(Chunk::new(0, 3), &rows, &mut graph)?;
    let second = emitter.emit_chunk(Chunk::new(1, 4), &rows, &mut graph)?;
    assert_eq!(first.cells, 9);
    assert_eq!(second.cells, 9);
    assert_eq!(graph.len(), metadata + 4 * 3 * 3, "4 rows x 3 variables x 3 nodes");

    // same nodes in the same order as a single pass over all rows
    let whole = convert(GeneratorConfig::default().with_values(true).with_all_rows(true));
    assert_eq!(graph.fingerprint()?, whole.fingerprint()?);
    Ok(())
}

#[test]
fn key_value_cells_land_in_the_data_store() {
    let descriptor = Descriptor::new(
        "settings.json",
        SourceFormat::KeyValue,
        vec![
            Variable::new("_id", "string"),
            Variable::new("key-1", "string"),
            Variable::new("key-2", "string"),
            Variable::new("value", "string").with_roles(&["value"]),
        ],
        3,
    )
    .expect("descriptor");
    let rows = InMemoryRows::new(
        4,
        vec![
            vec!["r1".into(), "display".into(), "theme".into(), "dark".into()],
            vec!["r2".into(), "display".into(), "scale".into(), "1.25".into()],
            vec!["r3".into(), "audio".into(), "volume".into(), "70".into()],
        ],
    )
    .expect("rows");
    let converter = Converter::new(GeneratorConfig::default().with_values(true).with_all_rows(true)).expect("converter");
    let conversion = converter.convert(&descriptor, &rows).expect("conversion");
    let graph = conversion.graph();

    assert_eq!(conversion.report().rows_processed, 3);
    assert_eq!(graph.count(NodeKind::DataPoint), 12);
    assert_eq!(graph.count(NodeKind::InstanceValue), 12);
    for point in graph.of_kind(NodeKind::DataPoint) {
        assert_eq!(point.property("has_DataPoint_OF_DataSet"), Some(&json!("#keyValueDataStore")));
    }
    assert_eq!(graph.count(NodeKind::VariableValueComponent), 1);
    for component in graph.nodes().iter().filter(|n| n.kind().is_component()) {
        assert!(component.references().contains(&NodeId::fixed("keyValueStructure")));
    }
    let value = graph.get(&NodeId::cell("instanceValue", 1, "value")).expect("value cell");
    assert_eq!(value.property("content"), Some(&json!({ "@type": "TypedString", "content": "1.25" })));
    assert_eq!(
        value.property("hasValueFrom_ValueDomain"),
        Some(&json!("#substantiveValueDomain-value"))
    );
    assert_eq!(conversion.report().undetermined_cells, 0);
}
