//! NodeManagement service set: add and delete nodes and references.
//!
//! Each operation comes in two forms. The `_async` form takes a completion
//! token and returns whatever that token produces. The plain form blocks on
//! [`UseSync`] and returns the result or the original fault.
//!
//! Callers without a preferred token pass
//! [`DefaultCompletionToken::default()`](ua_async_core::DefaultCompletionToken)
//! and get a [`ResponseFuture`](ua_async_core::ResponseFuture) back.

use ua_async_core::{send_request, CompletionToken, Connection, UseSync};

use super::response::{single_result, single_status, wrap_response};
use super::ServiceEngine;
use crate::messages::{ResponseVariant, ServiceResponse};
use crate::types::{
    ids, AddNodesItem, AddNodesRequest, AddNodesResponse, AddReferencesItem, AddReferencesRequest,
    AddReferencesResponse, DeleteNodesItem, DeleteNodesRequest, DeleteNodesResponse,
    DeleteReferencesItem, DeleteReferencesRequest, DeleteReferencesResponse, ModellingRule,
    NodeAttributes, NodeClass, NodeId, QualifiedName,
};

// ---------------------------------------------------------------------------
// NewNode
// ---------------------------------------------------------------------------

/// Description of a single node to add.
///
/// The constructors pick the type definition and reference type the protocol
/// uses by default for each kind of node; the `with_*` methods override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub node_class: NodeClass,
    pub parent_id: NodeId,
    /// Requested id; the null id lets the server assign one.
    pub id: NodeId,
    pub browse_name: String,
    pub attributes: NodeAttributes,
    pub type_definition: NodeId,
    pub reference_type: NodeId,
}

impl NewNode {
    fn with_defaults(
        node_class: NodeClass,
        parent_id: NodeId,
        id: NodeId,
        browse_name: impl Into<String>,
        type_definition: NodeId,
        reference_type: NodeId,
    ) -> Self {
        Self {
            node_class,
            parent_id,
            id,
            browse_name: browse_name.into(),
            attributes: NodeAttributes::default(),
            type_definition,
            reference_type,
        }
    }

    #[must_use]
    pub fn object(parent_id: NodeId, id: NodeId, browse_name: impl Into<String>) -> Self {
        Self::with_defaults(
            NodeClass::Object,
            parent_id,
            id,
            browse_name,
            ids::BASE_OBJECT_TYPE,
            ids::HAS_COMPONENT,
        )
    }

    #[must_use]
    pub fn folder(parent_id: NodeId, id: NodeId, browse_name: impl Into<String>) -> Self {
        Self::object(parent_id, id, browse_name).with_type_definition(ids::FOLDER_TYPE)
    }

    #[must_use]
    pub fn variable(parent_id: NodeId, id: NodeId, browse_name: impl Into<String>) -> Self {
        Self::with_defaults(
            NodeClass::Variable,
            parent_id,
            id,
            browse_name,
            ids::BASE_DATA_VARIABLE_TYPE,
            ids::HAS_COMPONENT,
        )
    }

    #[must_use]
    pub fn property(parent_id: NodeId, id: NodeId, browse_name: impl Into<String>) -> Self {
        Self::variable(parent_id, id, browse_name)
            .with_type_definition(ids::PROPERTY_TYPE)
            .with_reference_type(ids::HAS_PROPERTY)
    }

    #[must_use]
    pub fn method(parent_id: NodeId, id: NodeId, browse_name: impl Into<String>) -> Self {
        Self::with_defaults(
            NodeClass::Method,
            parent_id,
            id,
            browse_name,
            NodeId::NULL,
            ids::HAS_COMPONENT,
        )
    }

    #[must_use]
    pub fn object_type(parent_id: NodeId, id: NodeId, browse_name: impl Into<String>) -> Self {
        Self::with_defaults(
            NodeClass::ObjectType,
            parent_id,
            id,
            browse_name,
            NodeId::NULL,
            ids::HAS_SUBTYPE,
        )
    }

    #[must_use]
    pub fn variable_type(parent_id: NodeId, id: NodeId, browse_name: impl Into<String>) -> Self {
        Self::with_defaults(
            NodeClass::VariableType,
            parent_id,
            id,
            browse_name,
            ids::BASE_DATA_VARIABLE_TYPE,
            ids::HAS_SUBTYPE,
        )
    }

    #[must_use]
    pub fn reference_type(parent_id: NodeId, id: NodeId, browse_name: impl Into<String>) -> Self {
        Self::object_type(parent_id, id, browse_name).with_node_class(NodeClass::ReferenceType)
    }

    #[must_use]
    pub fn data_type(parent_id: NodeId, id: NodeId, browse_name: impl Into<String>) -> Self {
        Self::object_type(parent_id, id, browse_name).with_node_class(NodeClass::DataType)
    }

    #[must_use]
    pub fn view(parent_id: NodeId, id: NodeId, browse_name: impl Into<String>) -> Self {
        Self::with_defaults(
            NodeClass::View,
            parent_id,
            id,
            browse_name,
            NodeId::NULL,
            ids::ORGANIZES,
        )
    }

    #[must_use]
    fn with_node_class(mut self, node_class: NodeClass) -> Self {
        self.node_class = node_class;
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: NodeAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn with_type_definition(mut self, type_definition: NodeId) -> Self {
        self.type_definition = type_definition;
        self
    }

    #[must_use]
    pub fn with_reference_type(mut self, reference_type: NodeId) -> Self {
        self.reference_type = reference_type;
        self
    }

    /// Request item for this node. The browse name lives in the id's namespace.
    #[must_use]
    pub fn into_item(self) -> AddNodesItem {
        AddNodesItem {
            parent_node_id: self.parent_id,
            reference_type_id: self.reference_type,
            browse_name: QualifiedName::new(self.id.namespace_index, self.browse_name),
            requested_new_node_id: self.id,
            node_class: self.node_class,
            node_attributes: self.attributes,
            type_definition: self.type_definition,
        }
    }
}

// ---------------------------------------------------------------------------
// AddNodes
// ---------------------------------------------------------------------------

/// Sends a raw AddNodes request.
pub fn add_nodes_async<E, K>(connection: &Connection<E>, request: AddNodesRequest, token: K) -> K::Output
where
    E: ServiceEngine,
    K: CompletionToken<E, AddNodesResponse>,
{
    send_request(connection, request, wrap_response::<AddNodesResponse>(), token)
}

/// # Errors
///
/// Returns the request's fault; see [`UseSync`].
pub fn add_nodes<E: ServiceEngine>(
    connection: &Connection<E>,
    request: AddNodesRequest,
) -> anyhow::Result<AddNodesResponse> {
    add_nodes_async(connection, request, UseSync::default())
}

fn added_node_id(response: &mut ServiceResponse) -> anyhow::Result<NodeId> {
    let typed = AddNodesResponse::variant_mut(response)?;
    let result = single_result(&typed.response_header, &mut typed.results)?;
    result.status_code.check()?;
    Ok(std::mem::take(&mut result.added_node_id))
}

/// Adds one node and resolves to the id the server gave it.
pub fn add_node_async<E, K>(connection: &Connection<E>, node: NewNode, token: K) -> K::Output
where
    E: ServiceEngine,
    K: CompletionToken<E, NodeId>,
{
    tracing::debug!(browse_name = %node.browse_name, class = ?node.node_class, "adding node");
    let request = AddNodesRequest {
        nodes_to_add: vec![node.into_item()],
    };
    send_request(connection, request, added_node_id, token)
}

/// # Errors
///
/// Returns the node's status code as [`BadStatus`](ua_async_core::BadStatus)
/// if the server refused it.
pub fn add_node<E: ServiceEngine>(connection: &Connection<E>, node: NewNode) -> anyhow::Result<NodeId> {
    add_node_async(connection, node, UseSync::default())
}

// ---------------------------------------------------------------------------
// AddReferences
// ---------------------------------------------------------------------------

pub fn add_references_async<E, K>(
    connection: &Connection<E>,
    request: AddReferencesRequest,
    token: K,
) -> K::Output
where
    E: ServiceEngine,
    K: CompletionToken<E, AddReferencesResponse>,
{
    send_request(connection, request, wrap_response::<AddReferencesResponse>(), token)
}

/// # Errors
///
/// Returns the request's fault; see [`UseSync`].
pub fn add_references<E: ServiceEngine>(
    connection: &Connection<E>,
    request: AddReferencesRequest,
) -> anyhow::Result<AddReferencesResponse> {
    add_references_async(connection, request, UseSync::default())
}

/// Adds one reference from `source_id` to `target_id`.
pub fn add_reference_async<E, K>(
    connection: &Connection<E>,
    source_id: NodeId,
    target_id: NodeId,
    reference_type: NodeId,
    forward: bool,
    token: K,
) -> K::Output
where
    E: ServiceEngine,
    K: CompletionToken<E, ()>,
{
    let request = AddReferencesRequest {
        references_to_add: vec![AddReferencesItem {
            source_node_id: source_id,
            reference_type_id: reference_type,
            is_forward: forward,
            target_server_uri: None,
            target_node_id: target_id,
            target_node_class: NodeClass::Unspecified,
        }],
    };
    send_request(connection, request, single_status::<AddReferencesResponse>, token)
}

/// # Errors
///
/// Returns the reference's status code if the server refused it.
pub fn add_reference<E: ServiceEngine>(
    connection: &Connection<E>,
    source_id: NodeId,
    target_id: NodeId,
    reference_type: NodeId,
    forward: bool,
) -> anyhow::Result<()> {
    add_reference_async(
        connection,
        source_id,
        target_id,
        reference_type,
        forward,
        UseSync::default(),
    )
}

// ---------------------------------------------------------------------------
// DeleteNodes
// ---------------------------------------------------------------------------

pub fn delete_nodes_async<E, K>(
    connection: &Connection<E>,
    request: DeleteNodesRequest,
    token: K,
) -> K::Output
where
    E: ServiceEngine,
    K: CompletionToken<E, DeleteNodesResponse>,
{
    send_request(connection, request, wrap_response::<DeleteNodesResponse>(), token)
}

/// # Errors
///
/// Returns the request's fault; see [`UseSync`].
pub fn delete_nodes<E: ServiceEngine>(
    connection: &Connection<E>,
    request: DeleteNodesRequest,
) -> anyhow::Result<DeleteNodesResponse> {
    delete_nodes_async(connection, request, UseSync::default())
}

/// Deletes one node, and with `delete_references` every reference pointing at it.
pub fn delete_node_async<E, K>(
    connection: &Connection<E>,
    id: NodeId,
    delete_references: bool,
    token: K,
) -> K::Output
where
    E: ServiceEngine,
    K: CompletionToken<E, ()>,
{
    let request = DeleteNodesRequest {
        nodes_to_delete: vec![DeleteNodesItem {
            node_id: id,
            delete_target_references: delete_references,
        }],
    };
    send_request(connection, request, single_status::<DeleteNodesResponse>, token)
}

/// # Errors
///
/// Returns the node's status code if the server refused the deletion.
pub fn delete_node<E: ServiceEngine>(
    connection: &Connection<E>,
    id: NodeId,
    delete_references: bool,
) -> anyhow::Result<()> {
    delete_node_async(connection, id, delete_references, UseSync::default())
}

// ---------------------------------------------------------------------------
// DeleteReferences
// ---------------------------------------------------------------------------

pub fn delete_references_async<E, K>(
    connection: &Connection<E>,
    request: DeleteReferencesRequest,
    token: K,
) -> K::Output
where
    E: ServiceEngine,
    K: CompletionToken<E, DeleteReferencesResponse>,
{
    send_request(connection, request, wrap_response::<DeleteReferencesResponse>(), token)
}

/// # Errors
///
/// Returns the request's fault; see [`UseSync`].
pub fn delete_references<E: ServiceEngine>(
    connection: &Connection<E>,
    request: DeleteReferencesRequest,
) -> anyhow::Result<DeleteReferencesResponse> {
    delete_references_async(connection, request, UseSync::default())
}

/// Identifies one reference to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceToDelete {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub reference_type: NodeId,
    pub is_forward: bool,
    /// Also delete the inverse reference held by the target.
    pub delete_bidirectional: bool,
}

pub fn delete_reference_async<E, K>(
    connection: &Connection<E>,
    reference: ReferenceToDelete,
    token: K,
) -> K::Output
where
    E: ServiceEngine,
    K: CompletionToken<E, ()>,
{
    let request = DeleteReferencesRequest {
        references_to_delete: vec![DeleteReferencesItem {
            source_node_id: reference.source_id,
            reference_type_id: reference.reference_type,
            is_forward: reference.is_forward,
            target_node_id: reference.target_id,
            delete_bidirectional: reference.delete_bidirectional,
        }],
    };
    send_request(connection, request, single_status::<DeleteReferencesResponse>, token)
}

/// # Errors
///
/// Returns the reference's status code if the server refused the deletion.
pub fn delete_reference<E: ServiceEngine>(
    connection: &Connection<E>,
    reference: ReferenceToDelete,
) -> anyhow::Result<()> {
    delete_reference_async(connection, reference, UseSync::default())
}

// ---------------------------------------------------------------------------
// Convenience wrappers
// ---------------------------------------------------------------------------

macro_rules! node_shortcuts {
    ($($(#[$meta:meta])* $sync:ident, $async_fn:ident => $ctor:ident;)*) => {
        $(
            $(#[$meta])*
            pub fn $async_fn<E, K>(
                connection: &Connection<E>,
                parent_id: NodeId,
                id: NodeId,
                browse_name: &str,
                token: K,
            ) -> K::Output
            where
                E: ServiceEngine,
                K: CompletionToken<E, NodeId>,
            {
                add_node_async(connection, NewNode::$ctor(parent_id, id, browse_name), token)
            }

            $(#[$meta])*
            ///
            /// # Errors
            ///
            /// Returns the node's status code if the server refused it.
            pub fn $sync<E: ServiceEngine>(
                connection: &Connection<E>,
                parent_id: NodeId,
                id: NodeId,
                browse_name: &str,
            ) -> anyhow::Result<NodeId> {
                $async_fn(connection, parent_id, id, browse_name, UseSync::default())
            }
        )*
    };
}

node_shortcuts! {
    /// Adds an object of `BaseObjectType` below `parent_id` (`HasComponent`).
    add_object, add_object_async => object;
    /// Adds a folder (`FolderType`) below `parent_id` (`HasComponent`).
    add_folder, add_folder_async => folder;
    /// Adds a variable of `BaseDataVariableType` below `parent_id` (`HasComponent`).
    add_variable, add_variable_async => variable;
    /// Adds a property (`PropertyType`) to `parent_id` (`HasProperty`).
    add_property, add_property_async => property;
    /// Adds a method below `parent_id` (`HasComponent`).
    add_method, add_method_async => method;
    /// Adds an object type as a subtype of `parent_id` (`HasSubtype`).
    add_object_type, add_object_type_async => object_type;
    /// Adds a variable type as a subtype of `parent_id` (`HasSubtype`).
    add_variable_type, add_variable_type_async => variable_type;
    /// Adds a reference type as a subtype of `parent_id` (`HasSubtype`).
    add_reference_type, add_reference_type_async => reference_type;
    /// Adds a data type as a subtype of `parent_id` (`HasSubtype`).
    add_data_type, add_data_type_async => data_type;
    /// Adds a view below `parent_id` (`Organizes`).
    add_view, add_view_async => view;
}

/// Attaches a modelling rule to the instance declaration `id`.
pub fn add_modelling_rule_async<E, K>(
    connection: &Connection<E>,
    id: NodeId,
    rule: ModellingRule,
    token: K,
) -> K::Output
where
    E: ServiceEngine,
    K: CompletionToken<E, ()>,
{
    add_reference_async(
        connection,
        id,
        rule.node_id(),
        ids::HAS_MODELLING_RULE,
        true,
        token,
    )
}

/// # Errors
///
/// Returns the reference's status code if the server refused it.
pub fn add_modelling_rule<E: ServiceEngine>(
    connection: &Connection<E>,
    id: NodeId,
    rule: ModellingRule,
) -> anyhow::Result<()> {
    add_modelling_rule_async(connection, id, rule, UseSync::default())
}
