//! Settings snapshots exchanged over the bus. Each service owns its live copy;
//! callers only ever receive clones.

use serde::{Deserialize, Serialize};

use super::{LedSegment, NodeDefinition};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSettings {
    pub local_address: String,
    pub node_definitions: Vec<NodeDefinition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSettings {
    pub segment_definition: LedSegment,
    pub segment_count: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RenderSettings {
    pub pattern: String,
    pub frequency_ms: u64,
    pub pixel_size: u32,
}

/// What a render-settings fetch returns: the running settings plus every
/// pattern the generator knows.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RenderStatus {
    pub settings: RenderSettings,
    pub patterns: Vec<String>,
}
