use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Graph payload handed to the visualization client
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphDocument {
    pub report_name: String,
    pub report_description: String,
    pub report_key: String,
    pub summary: Vec<SummaryItem>,
    pub groups: Vec<GroupEntry>,
    pub types: Vec<TypeEntry>,
    pub link_types: Vec<LinkTypeEntry>,
    pub nodes: Vec<NodeEntry>,
    pub links: Vec<LinkEntry>,
}

impl GraphDocument {
    pub fn summary_value(&self, key: &str) -> Option<&str> {
        self.summary
            .iter()
            .find(|s| s.key == key)
            .map(|s| s.value.as_str())
    }
}

/// Serialized as a single-key object `{"<key>": "<value>"}`
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryItem {
    pub key: String,
    pub value: String,
}

impl Serialize for SummaryItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.key, &self.value)?;
        map.end()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GroupEntry {
    pub id: String,
    pub name: String,
    pub group_count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TypeEntry {
    pub id: String,
    pub label: String,
    pub is_img: bool,
    pub img_stub: String,
    pub type_count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LinkTypeEntry {
    pub id: String,
    pub label: String,
    pub link_type_count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NodeEntry {
    pub name: String,
    pub short_name: String,
    /// Dense id of the node's group
    pub group: i64,
    pub size: i64,
    /// Dense id of the node's type
    #[serde(rename = "type")]
    pub node_type: i64,
    /// Natural key
    pub id: String,
    pub weight_sum: i64,
    pub degree: i64,
    /// Dense node id, what links refer to
    pub my_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img: Option<NodeImage>,
}

/// `img` of a node that has the column; a NULL image serializes as `false`
#[derive(Debug, Clone, PartialEq)]
pub enum NodeImage {
    Missing,
    Url(String),
}

impl Serialize for NodeImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NodeImage::Missing => serializer.serialize_bool(false),
            NodeImage::Url(url) => serializer.serialize_str(url),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LinkEntry {
    pub source: i64,
    pub target: i64,
    pub weight: f64,
    pub link_type: i64,
}

/// First `max` characters of `name`
pub fn short_name(name: &str, max: usize) -> String {
    name.chars().take(max).collect()
}
