use serde_json::json;
use tracing::debug;

use crate::descriptor::{Descriptor, Variable};
use crate::domain::ValueDomains;
use crate::error::{ConversionError, Result};
use crate::graph::{Node, NodeId, NodeKind, NodeSink};
use crate::role::RoleSet;
use crate::structure::StructureProfile;

pub fn instance_variable_id(variable: &str) -> NodeId {
    NodeId::of("instanceVariable", variable)
}

/// Emits the per-variable node set for every variable in declaration order:
/// domains, value mapping, instance variable, value mapping position, role
/// components and the component position. Membership in the logical record,
/// the segment layout and the structure is recorded on the member, since those
/// containers are emitted first.
pub struct ComponentGenerator<'a> {
    profile: &'a dyn StructureProfile,
    logical_record: NodeId,
    segment_layout: NodeId,
}

impl<'a> ComponentGenerator<'a> {
    pub fn new(profile: &'a dyn StructureProfile, logical_record: NodeId, segment_layout: NodeId) -> Self {
        Self {
            profile,
            logical_record,
            segment_layout,
        }
    }

    /// Nodes for the variable at `index` (zero-based declaration order).
    pub fn nodes_for(
        &self,
        index: usize,
        variable: &Variable,
        roles: &RoleSet,
        domains: &ValueDomains,
    ) -> Result<Vec<Node>> {
        if roles.is_empty() {
            return Err(ConversionError::EmptyRoleSet { variable: variable.name().to_owned() });
        }
        let name = variable.name();
        let (_, structure) = self.profile.structure();
        let mut nodes = domains.nodes();

        let value_mapping = NodeId::of("valueMapping", name);
        nodes.push(Node::new(value_mapping.clone(), NodeKind::ValueMapping).with("defaultValue", ""));

        let instance_variable = instance_variable_id(name);
        let mut node = Node::new(instance_variable.clone(), NodeKind::InstanceVariable)
            .with("name", json!({ "@type": "ObjectName", "name": name }))
            .with(
                "displayLabel",
                json!({
                    "@type": "LabelForDisplay",
                    "locationVariant": { "@type": "ControlledVocabularyEntry", "entryValue": variable.label() }
                }),
            )
            .vocabulary_entry("physicalDataType", &domains.xsd().uri())
            .link("has_PhysicalSegmentLayout", &self.segment_layout)
            .link("has_ValueMapping", &value_mapping)
            .link("has_InstanceVariable_OF_LogicalRecord", &self.logical_record)
            .link(
                "takesSubstantiveValuesFrom_SubstantiveValueDomain",
                domains.substantive().id(),
            );
        if let Some(sentinel) = domains.sentinel() {
            node = node.link("takesSentinelValuesFrom", sentinel.id());
        }
        nodes.push(node);
        nodes.push(
            Node::new(NodeId::of("valueMappingPosition", name), NodeKind::ValueMappingPosition)
                .with("value", index)
                .link("indexes", &value_mapping)
                .link("has_ValueMappingPosition_OF_PhysicalSegmentLayout", &self.segment_layout),
        );

        let mut components = Vec::with_capacity(roles.len());
        for spec in self.profile.components(roles)? {
            let component = spec.id(name);
            nodes.push(
                Node::new(component.clone(), spec.kind)
                    .link(spec.defined_by, &instance_variable)
                    .link("has_DataStructureComponent_OF_DataStructure", &structure),
            );
            components.push(component);
        }
        nodes.push(
            Node::new(NodeId::of("componentPosition", name), NodeKind::ComponentPosition)
                .with("value", index + 1)
                .links("indexes", &components)
                .link("has_ComponentPosition_OF_DataStructure", &structure),
        );
        Ok(nodes)
    }

    pub fn emit(
        &self,
        descriptor: &Descriptor,
        roles: &[RoleSet],
        domains: &[ValueDomains],
        sink: &mut dyn NodeSink,
    ) -> Result<usize> {
        if roles.len() != descriptor.width() || domains.len() != descriptor.width() {
            return Err(ConversionError::Invariant(format!(
                "{} variables but {} role sets and {} domain sets",
                descriptor.width(),
                roles.len(),
                domains.len()
            )));
        }
        let mut emitted = 0;
        for (index, variable) in descriptor.variables().iter().enumerate() {
            let nodes = self.nodes_for(index, variable, &roles[index], &domains[index])?;
            emitted += nodes.len();
            for node in nodes {
                sink.keep(node)?;
            }
            debug!(variable = variable.name(), position = index + 1, roles = %roles[index], "emitted variable");
        }
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SourceFormat;
    use crate::role::WideRole;
    use crate::structure::profile_for;
    use std::collections::BTreeSet;

    #[test]
    fn two_roles_give_two_components_on_one_variable() {
        let variable = Variable::new("region", "string");
        let descriptor =
            Descriptor::new("survey.sav", SourceFormat::tabular(), vec![variable.clone()], 10).expect("descriptor");
        let profile = profile_for(&descriptor);
        let generator = ComponentGenerator::new(
            profile.as_ref(),
            NodeId::fixed("logicalRecord"),
            NodeId::fixed("physicalSegmentLayout"),
        );
        let domains = ValueDomains::build(&variable).expect("domains");
        let nodes = generator
            .nodes_for(0, &variable, &RoleSet::wide(&[WideRole::Identifier, WideRole::Attribute]), &domains)
            .expect("nodes");
        let components: Vec<&Node> = nodes.iter().filter(|n| n.kind().is_component()).collect();
        assert_eq!(components.len(), 2);
        let position = nodes.last().expect("position");
        assert_eq!(position.kind(), NodeKind::ComponentPosition);
        assert_eq!(position.property("value"), Some(&json!(1)));
        assert_eq!(position.references().len(), 3);
        let mapping = nodes
            .iter()
            .find(|n| n.kind() == NodeKind::ValueMappingPosition)
            .expect("value mapping position");
        assert_eq!(mapping.property("value"), Some(&json!(0)));
    }

    #[test]
    fn empty_role_set_is_fatal() {
        let variable = Variable::new("region", "string");
        let descriptor =
            Descriptor::new("survey.sav", SourceFormat::tabular(), vec![variable.clone()], 10).expect("descriptor");
        let profile = profile_for(&descriptor);
        let generator = ComponentGenerator::new(
            profile.as_ref(),
            NodeId::fixed("logicalRecord"),
            NodeId::fixed("physicalSegmentLayout"),
        );
        let domains = ValueDomains::build(&variable).expect("domains");
        let result = generator.nodes_for(0, &variable, &RoleSet::Wide(BTreeSet::new()), &domains);
        assert!(matches!(result, Err(ConversionError::EmptyRoleSet { .. })));
    }
}
