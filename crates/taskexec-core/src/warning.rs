//! Scheduling warnings attached to unscheduled algorithms.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resources::{ResourceAmounts, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningCode {
    Resources,
    InvalidVolume,
    JobCreationFailed,
    Kai,
    Unknown,
}

/// Why one node could not host a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeShortfall {
    pub node_name: String,
    /// Missing amount per dimension, rounded to two decimals.
    pub amounts_missing: BTreeMap<ResourceKind, f64>,
    /// Dimensions where the request exceeds the node's allowed capacity.
    pub requests_over_max_capacity: Vec<ResourceKind>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Selector entries as `key=value`.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub requested_selectors: Vec<String>,
    pub num_unmatched_nodes_by_selector: usize,
    pub nodes: Vec<NodeShortfall>,
}

/// Human-readable scheduling problem for one algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub algorithm_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
    /// Whether the condition is expected to persist rather than clear on its own.
    pub surpass_timeout: bool,
    pub message: String,
    pub timestamp: u64,
    pub code: WarningCode,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complex_resource_descriptor: Option<ResourceDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_resources: Option<ResourceAmounts>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub missing_volumes: Vec<String>,
}

impl Warning {
    pub fn new(algorithm_name: &str, code: WarningCode, message: String, timestamp: u64) -> Self {
        Self {
            algorithm_name: algorithm_name.to_string(),
            kind: "warning".to_string(),
            reason: "failedScheduling".to_string(),
            surpass_timeout: false,
            message,
            timestamp,
            code,
            is_error: false,
            algorithm_version: None,
            complex_resource_descriptor: None,
            requested_resources: None,
            missing_volumes: Vec::new(),
        }
    }
}
