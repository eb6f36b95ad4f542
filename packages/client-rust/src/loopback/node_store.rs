//! In-memory address space served by the loopback engine.
//!
//! Holds just enough of the data model to validate NodeManagement requests
//! the way a server would: node classes, browse names and references.

use std::collections::HashMap;

use ua_async_core::StatusCode;

use crate::messages::{ServiceRequest, ServiceResponse};
use crate::types::{
    ids, AddNodesItem, AddNodesResponse, AddNodesResult, AddReferencesItem, AddReferencesResponse,
    DeleteNodesItem, DeleteNodesResponse, DeleteReferencesItem, DeleteReferencesResponse,
    NodeAttributes, NodeClass, NodeId, QualifiedName, ResponseHeader,
};

/// One reference as held by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub reference_type: NodeId,
    pub target: NodeId,
    pub is_forward: bool,
}

/// A node in the store.
#[derive(Debug, Clone)]
pub struct Node {
    pub node_class: NodeClass,
    pub browse_name: QualifiedName,
    pub attributes: NodeAttributes,
    pub references: Vec<Reference>,
}

impl Node {
    fn new(node_class: NodeClass, browse_name: QualifiedName, attributes: NodeAttributes) -> Self {
        Self {
            node_class,
            browse_name,
            attributes,
            references: Vec::new(),
        }
    }
}

/// Namespace-0 nodes every store starts with.
const SEED: &[(NodeId, NodeClass, &str)] = &[
    (ids::ROOT_FOLDER, NodeClass::Object, "Root"),
    (ids::OBJECTS_FOLDER, NodeClass::Object, "Objects"),
    (ids::TYPES_FOLDER, NodeClass::Object, "Types"),
    (ids::VIEWS_FOLDER, NodeClass::Object, "Views"),
    (ids::REFERENCES, NodeClass::ReferenceType, "References"),
    (ids::HIERARCHICAL_REFERENCES, NodeClass::ReferenceType, "HierarchicalReferences"),
    (ids::ORGANIZES, NodeClass::ReferenceType, "Organizes"),
    (ids::HAS_MODELLING_RULE, NodeClass::ReferenceType, "HasModellingRule"),
    (ids::HAS_TYPE_DEFINITION, NodeClass::ReferenceType, "HasTypeDefinition"),
    (ids::HAS_SUBTYPE, NodeClass::ReferenceType, "HasSubtype"),
    (ids::HAS_PROPERTY, NodeClass::ReferenceType, "HasProperty"),
    (ids::HAS_COMPONENT, NodeClass::ReferenceType, "HasComponent"),
    (ids::BASE_DATA_TYPE, NodeClass::DataType, "BaseDataType"),
    (ids::BASE_OBJECT_TYPE, NodeClass::ObjectType, "BaseObjectType"),
    (ids::FOLDER_TYPE, NodeClass::ObjectType, "FolderType"),
    (ids::MODELLING_RULE_TYPE, NodeClass::ObjectType, "ModellingRuleType"),
    (ids::BASE_VARIABLE_TYPE, NodeClass::VariableType, "BaseVariableType"),
    (ids::BASE_DATA_VARIABLE_TYPE, NodeClass::VariableType, "BaseDataVariableType"),
    (ids::PROPERTY_TYPE, NodeClass::VariableType, "PropertyType"),
    (ids::MODELLING_RULE_MANDATORY, NodeClass::Object, "Mandatory"),
    (ids::MODELLING_RULE_OPTIONAL, NodeClass::Object, "Optional"),
    (ids::MODELLING_RULE_EXPOSES_ITS_ARRAY, NodeClass::Object, "ExposesItsArray"),
    (ids::MODELLING_RULE_OPTIONAL_PLACEHOLDER, NodeClass::Object, "OptionalPlaceholder"),
    (ids::MODELLING_RULE_MANDATORY_PLACEHOLDER, NodeClass::Object, "MandatoryPlaceholder"),
];

/// Address space keyed by node id.
#[derive(Debug)]
pub struct NodeStore {
    nodes: HashMap<NodeId, Node>,
    assign_namespace: u16,
    next_assigned: u32,
}

impl NodeStore {
    /// Creates a store holding the namespace-0 seed nodes.
    ///
    /// Nodes added without a requested id get numeric ids in `assign_namespace`.
    #[must_use]
    pub fn new(assign_namespace: u16) -> Self {
        let mut store = Self {
            nodes: HashMap::new(),
            assign_namespace,
            next_assigned: 1,
        };
        for (id, node_class, name) in SEED {
            store.nodes.insert(
                id.clone(),
                Node::new(*node_class, QualifiedName::new(0, *name), NodeAttributes::default()),
            );
        }
        for folder in [ids::OBJECTS_FOLDER, ids::TYPES_FOLDER, ids::VIEWS_FOLDER] {
            store.link(&ids::ROOT_FOLDER, &ids::ORGANIZES, &folder);
        }
        store
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Whether `source` holds a reference of `reference_type` to `target`.
    #[must_use]
    pub fn has_reference(&self, source: &NodeId, reference_type: &NodeId, target: &NodeId, is_forward: bool) -> bool {
        self.nodes.get(source).is_some_and(|node| {
            node.references.contains(&Reference {
                reference_type: reference_type.clone(),
                target: target.clone(),
                is_forward,
            })
        })
    }

    // -----------------------------------------------------------------------
    // Request processing
    // -----------------------------------------------------------------------

    /// Serves one request. An empty item list yields a `BadNothingToDo` fault.
    pub fn process(&mut self, request: ServiceRequest, request_handle: u32) -> ServiceResponse {
        let header = ResponseHeader {
            request_handle,
            service_result: StatusCode::GOOD,
        };
        match request {
            ServiceRequest::AddNodes(r) if r.nodes_to_add.is_empty() => nothing_to_do(request_handle),
            ServiceRequest::AddNodes(r) => ServiceResponse::AddNodes(AddNodesResponse {
                response_header: header,
                results: r.nodes_to_add.into_iter().map(|item| self.add_node(item)).collect(),
            }),
            ServiceRequest::AddReferences(r) if r.references_to_add.is_empty() => {
                nothing_to_do(request_handle)
            }
            ServiceRequest::AddReferences(r) => ServiceResponse::AddReferences(AddReferencesResponse {
                response_header: header,
                results: r
                    .references_to_add
                    .iter()
                    .map(|item| self.add_reference(item))
                    .collect(),
            }),
            ServiceRequest::DeleteNodes(r) if r.nodes_to_delete.is_empty() => nothing_to_do(request_handle),
            ServiceRequest::DeleteNodes(r) => ServiceResponse::DeleteNodes(DeleteNodesResponse {
                response_header: header,
                results: r.nodes_to_delete.iter().map(|item| self.delete_node(item)).collect(),
            }),
            ServiceRequest::DeleteReferences(r) if r.references_to_delete.is_empty() => {
                nothing_to_do(request_handle)
            }
            ServiceRequest::DeleteReferences(r) => {
                ServiceResponse::DeleteReferences(DeleteReferencesResponse {
                    response_header: header,
                    results: r
                        .references_to_delete
                        .iter()
                        .map(|item| self.delete_reference(item))
                        .collect(),
                })
            }
        }
    }

    /// Adds one node below its parent.
    pub fn add_node(&mut self, item: AddNodesItem) -> AddNodesResult {
        let status = self.validate_new_node(&item);
        if status.is_bad() {
            tracing::debug!(browse_name = %item.browse_name, %status, "add node refused");
            return AddNodesResult {
                status_code: status,
                added_node_id: NodeId::NULL,
            };
        }

        let id = if item.requested_new_node_id.is_null() {
            self.assign_id()
        } else {
            item.requested_new_node_id
        };
        self.nodes.insert(
            id.clone(),
            Node::new(item.node_class, item.browse_name, item.node_attributes),
        );
        self.link(&item.parent_node_id, &item.reference_type_id, &id);
        if !item.type_definition.is_null() {
            self.link(&id, &ids::HAS_TYPE_DEFINITION, &item.type_definition);
        }
        tracing::debug!(node_id = %id, "node added");
        AddNodesResult {
            status_code: StatusCode::GOOD,
            added_node_id: id,
        }
    }

    fn validate_new_node(&self, item: &AddNodesItem) -> StatusCode {
        if item.browse_name.name.is_empty() {
            return StatusCode::BAD_BROWSE_NAME_INVALID;
        }
        if item.node_class == NodeClass::Unspecified {
            return StatusCode::BAD_NODE_CLASS_INVALID;
        }
        if !self.contains(&item.parent_node_id) {
            return StatusCode::BAD_PARENT_NODE_ID_INVALID;
        }
        if !self.is_reference_type(&item.reference_type_id) {
            return StatusCode::BAD_REFERENCE_TYPE_ID_INVALID;
        }
        if !item.requested_new_node_id.is_null() && self.contains(&item.requested_new_node_id) {
            return StatusCode::BAD_NODE_ID_EXISTS;
        }
        let type_class = self.class_of(&item.type_definition);
        let type_ok = match item.node_class {
            NodeClass::Object => type_class == Some(NodeClass::ObjectType),
            NodeClass::Variable => type_class == Some(NodeClass::VariableType),
            NodeClass::VariableType => {
                item.type_definition.is_null() || type_class == Some(NodeClass::VariableType)
            }
            _ => item.type_definition.is_null(),
        };
        if !type_ok {
            return StatusCode::BAD_TYPE_DEFINITION_INVALID;
        }
        StatusCode::GOOD
    }

    /// Adds one reference, plus its inverse on the target.
    pub fn add_reference(&mut self, item: &AddReferencesItem) -> StatusCode {
        if !self.contains(&item.source_node_id) {
            return StatusCode::BAD_SOURCE_NODE_ID_INVALID;
        }
        if !self.is_reference_type(&item.reference_type_id) {
            return StatusCode::BAD_REFERENCE_TYPE_ID_INVALID;
        }
        if item.target_server_uri.as_deref().is_some_and(|uri| !uri.is_empty()) {
            return StatusCode::BAD_REFERENCE_NOT_ALLOWED;
        }
        let Some(target_class) = self.class_of(&item.target_node_id) else {
            return StatusCode::BAD_TARGET_NODE_ID_INVALID;
        };
        if item.target_node_class != NodeClass::Unspecified && item.target_node_class != target_class {
            return StatusCode::BAD_NODE_CLASS_INVALID;
        }
        if self.has_reference(
            &item.source_node_id,
            &item.reference_type_id,
            &item.target_node_id,
            item.is_forward,
        ) {
            return StatusCode::BAD_DUPLICATE_REFERENCE_NOT_ALLOWED;
        }

        let (from, to) = if item.is_forward {
            (&item.source_node_id, &item.target_node_id)
        } else {
            (&item.target_node_id, &item.source_node_id)
        };
        self.link(from, &item.reference_type_id, to);
        StatusCode::GOOD
    }

    /// Removes one node with every reference it holds.
    ///
    /// With `delete_target_references` the inverse halves held by other nodes
    /// go too; otherwise they are left dangling, as a server would.
    pub fn delete_node(&mut self, item: &DeleteNodesItem) -> StatusCode {
        let Some(node) = self.nodes.remove(&item.node_id) else {
            return StatusCode::BAD_NODE_ID_UNKNOWN;
        };
        if item.delete_target_references {
            for other in self.nodes.values_mut() {
                other.references.retain(|r| r.target != item.node_id);
            }
        }
        tracing::debug!(node_id = %item.node_id, references = node.references.len(), "node deleted");
        StatusCode::GOOD
    }

    /// Removes one reference, and with `delete_bidirectional` its inverse.
    pub fn delete_reference(&mut self, item: &DeleteReferencesItem) -> StatusCode {
        let Some(source) = self.nodes.get_mut(&item.source_node_id) else {
            return StatusCode::BAD_SOURCE_NODE_ID_INVALID;
        };
        let wanted = Reference {
            reference_type: item.reference_type_id.clone(),
            target: item.target_node_id.clone(),
            is_forward: item.is_forward,
        };
        let before = source.references.len();
        source.references.retain(|r| *r != wanted);
        if source.references.len() == before {
            return StatusCode::BAD_NOT_FOUND;
        }

        if item.delete_bidirectional {
            let inverse = Reference {
                reference_type: item.reference_type_id.clone(),
                target: item.source_node_id.clone(),
                is_forward: !item.is_forward,
            };
            if let Some(target) = self.nodes.get_mut(&item.target_node_id) {
                target.references.retain(|r| *r != inverse);
            }
        }
        StatusCode::GOOD
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn class_of(&self, id: &NodeId) -> Option<NodeClass> {
        self.nodes.get(id).map(|node| node.node_class)
    }

    fn is_reference_type(&self, id: &NodeId) -> bool {
        self.class_of(id) == Some(NodeClass::ReferenceType)
    }

    /// Records a forward reference on `source` and the inverse on `target`.
    fn link(&mut self, source: &NodeId, reference_type: &NodeId, target: &NodeId) {
        if let Some(node) = self.nodes.get_mut(source) {
            node.references.push(Reference {
                reference_type: reference_type.clone(),
                target: target.clone(),
                is_forward: true,
            });
        }
        if let Some(node) = self.nodes.get_mut(target) {
            node.references.push(Reference {
                reference_type: reference_type.clone(),
                target: source.clone(),
                is_forward: false,
            });
        }
    }

    fn assign_id(&mut self) -> NodeId {
        loop {
            let id = NodeId::numeric(self.assign_namespace, self.next_assigned);
            self.next_assigned = self.next_assigned.wrapping_add(1);
            if !self.contains(&id) {
                return id;
            }
        }
    }
}

fn nothing_to_do(request_handle: u32) -> ServiceResponse {
    ServiceResponse::fault(request_handle, StatusCode::BAD_NOTHING_TO_DO)
}
