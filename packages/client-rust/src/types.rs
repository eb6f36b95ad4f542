//! Protocol value types for the NodeManagement service set.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` and are framed with
//! named `MsgPack` (`rmp_serde::to_vec_named()`).

use std::fmt;

use serde::{Deserialize, Serialize};
use ua_async_core::StatusCode;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Identifier {
    Numeric(u32),
    String(String),
}

/// Node identifier: namespace index plus identifier.
///
/// The default value (`ns=0;i=0`) is the null node id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeId {
    pub namespace_index: u16,
    pub identifier: Identifier,
}

impl NodeId {
    pub const NULL: Self = Self::numeric(0, 0);

    #[must_use]
    pub const fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: Identifier::Numeric(value),
        }
    }

    #[must_use]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: Identifier::String(value.into()),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index != 0 {
            write!(f, "ns={};", self.namespace_index)?;
        }
        match &self.identifier {
            Identifier::Numeric(value) => write!(f, "i={value}"),
            Identifier::String(value) => write!(f, "s={value}"),
        }
    }
}

/// Browse name: namespace index plus name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifiedName {
    pub namespace_index: u16,
    pub name: String,
}

impl QualifiedName {
    #[must_use]
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace_index, self.name)
    }
}

/// Node class, with the protocol's bit-mask values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    #[default]
    Unspecified = 0,
    Object = 1,
    Variable = 2,
    Method = 4,
    ObjectType = 8,
    VariableType = 16,
    ReferenceType = 32,
    DataType = 64,
    View = 128,
}

/// Modelling rule attached to instance declarations of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModellingRule {
    Mandatory,
    Optional,
    ExposesItsArray,
    OptionalPlaceholder,
    MandatoryPlaceholder,
}

impl ModellingRule {
    /// Node id of the modelling rule object in namespace 0.
    #[must_use]
    pub const fn node_id(self) -> NodeId {
        match self {
            Self::Mandatory => ids::MODELLING_RULE_MANDATORY,
            Self::Optional => ids::MODELLING_RULE_OPTIONAL,
            Self::ExposesItsArray => ids::MODELLING_RULE_EXPOSES_ITS_ARRAY,
            Self::OptionalPlaceholder => ids::MODELLING_RULE_OPTIONAL_PLACEHOLDER,
            Self::MandatoryPlaceholder => ids::MODELLING_RULE_MANDATORY_PLACEHOLDER,
        }
    }
}

/// Well-known namespace-0 node ids.
pub mod ids {
    use super::NodeId;

    pub const ROOT_FOLDER: NodeId = NodeId::numeric(0, 84);
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);
    pub const TYPES_FOLDER: NodeId = NodeId::numeric(0, 86);
    pub const VIEWS_FOLDER: NodeId = NodeId::numeric(0, 87);

    pub const REFERENCES: NodeId = NodeId::numeric(0, 31);
    pub const HIERARCHICAL_REFERENCES: NodeId = NodeId::numeric(0, 33);
    pub const ORGANIZES: NodeId = NodeId::numeric(0, 35);
    pub const HAS_MODELLING_RULE: NodeId = NodeId::numeric(0, 37);
    pub const HAS_TYPE_DEFINITION: NodeId = NodeId::numeric(0, 40);
    pub const HAS_SUBTYPE: NodeId = NodeId::numeric(0, 45);
    pub const HAS_PROPERTY: NodeId = NodeId::numeric(0, 46);
    pub const HAS_COMPONENT: NodeId = NodeId::numeric(0, 47);

    pub const BASE_DATA_TYPE: NodeId = NodeId::numeric(0, 24);
    pub const BASE_OBJECT_TYPE: NodeId = NodeId::numeric(0, 58);
    pub const FOLDER_TYPE: NodeId = NodeId::numeric(0, 61);
    pub const BASE_VARIABLE_TYPE: NodeId = NodeId::numeric(0, 62);
    pub const BASE_DATA_VARIABLE_TYPE: NodeId = NodeId::numeric(0, 63);
    pub const PROPERTY_TYPE: NodeId = NodeId::numeric(0, 68);
    pub const MODELLING_RULE_TYPE: NodeId = NodeId::numeric(0, 77);

    pub const MODELLING_RULE_MANDATORY: NodeId = NodeId::numeric(0, 78);
    pub const MODELLING_RULE_OPTIONAL: NodeId = NodeId::numeric(0, 80);
    pub const MODELLING_RULE_EXPOSES_ITS_ARRAY: NodeId = NodeId::numeric(0, 83);
    pub const MODELLING_RULE_OPTIONAL_PLACEHOLDER: NodeId = NodeId::numeric(0, 11508);
    pub const MODELLING_RULE_MANDATORY_PLACEHOLDER: NodeId = NodeId::numeric(0, 11510);
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// Optional attributes set on a new node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAttributes {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

impl NodeAttributes {
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Header carried by every response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseHeader {
    pub request_handle: u32,
    pub service_result: StatusCode,
}

// ---------------------------------------------------------------------------
// AddNodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodesItem {
    pub parent_node_id: NodeId,
    pub reference_type_id: NodeId,
    /// Null lets the server assign an id.
    pub requested_new_node_id: NodeId,
    pub browse_name: QualifiedName,
    pub node_class: NodeClass,
    pub node_attributes: NodeAttributes,
    pub type_definition: NodeId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodesResult {
    pub status_code: StatusCode,
    pub added_node_id: NodeId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodesRequest {
    pub nodes_to_add: Vec<AddNodesItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNodesResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<AddNodesResult>,
}

// ---------------------------------------------------------------------------
// AddReferences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReferencesItem {
    pub source_node_id: NodeId,
    pub reference_type_id: NodeId,
    pub is_forward: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_server_uri: Option<String>,
    pub target_node_id: NodeId,
    pub target_node_class: NodeClass,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReferencesRequest {
    pub references_to_add: Vec<AddReferencesItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReferencesResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

// ---------------------------------------------------------------------------
// DeleteNodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNodesItem {
    pub node_id: NodeId,
    pub delete_target_references: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNodesRequest {
    pub nodes_to_delete: Vec<DeleteNodesItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNodesResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

// ---------------------------------------------------------------------------
// DeleteReferences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReferencesItem {
    pub source_node_id: NodeId,
    pub reference_type_id: NodeId,
    pub is_forward: bool,
    pub target_node_id: NodeId,
    pub delete_bidirectional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReferencesRequest {
    pub references_to_delete: Vec<DeleteReferencesItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReferencesResponse {
    pub response_header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        assert_eq!(ids::OBJECTS_FOLDER.to_string(), "i=85");
        assert_eq!(NodeId::numeric(1, 1000).to_string(), "ns=1;i=1000");
        assert_eq!(NodeId::string(2, "Pump").to_string(), "ns=2;s=Pump");
    }

    #[test]
    fn default_node_id_is_null() {
        assert!(NodeId::default().is_null());
        assert!(!ids::ROOT_FOLDER.is_null());
        assert!(!NodeId::string(0, "").is_null());
    }

    #[test]
    fn qualified_name_display() {
        assert_eq!(QualifiedName::new(0, "Objects").to_string(), "0:Objects");
    }

    #[test]
    fn modelling_rules_map_to_namespace_zero() {
        assert_eq!(ModellingRule::Mandatory.node_id(), NodeId::numeric(0, 78));
        assert_eq!(ModellingRule::Optional.node_id(), NodeId::numeric(0, 80));
        assert_eq!(ModellingRule::MandatoryPlaceholder.node_id(), NodeId::numeric(0, 11510));
    }

    #[test]
    fn node_class_values_match_protocol_mask() {
        assert_eq!(NodeClass::Object as u32, 1);
        assert_eq!(NodeClass::View as u32, 128);
        assert_eq!(NodeClass::default(), NodeClass::Unspecified);
    }

    #[test]
    fn attributes_builder() {
        let attrs = NodeAttributes::default()
            .with_display_name("Pump")
            .with_description("Main pump");
        assert_eq!(attrs.display_name.as_deref(), Some("Pump"));
        assert_eq!(attrs.description.as_deref(), Some("Main pump"));
    }

    #[test]
    fn response_serializes_with_camel_case_fields() {
        let response = AddNodesResponse {
            response_header: ResponseHeader {
                request_handle: 3,
                service_result: StatusCode::GOOD,
            },
            results: vec![AddNodesResult {
                status_code: StatusCode::GOOD,
                added_node_id: NodeId::numeric(1, 7),
            }],
        };
        let bytes = rmp_serde::to_vec_named(&response).expect("serialize");
        let value: rmpv::Value = rmp_serde::from_slice(&bytes).expect("decode as value");
        let keys: Vec<&str> = value
            .as_map()
            .expect("map")
            .iter()
            .filter_map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, vec!["responseHeader", "results"]);

        let decoded: AddNodesResponse = rmp_serde::from_slice(&bytes).expect("deserialize");
        assert_eq!(decoded, response);
    }
}
