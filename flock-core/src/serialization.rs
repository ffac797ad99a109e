//! Plain, serializable form of agents and flocks
//!
//! Agents round-trip through this nested mapping for YAML/JSON files and
//! durable-engine payloads:
//!
//! ```yaml
//! name: writer
//! model: openai/gpt-4o
//! description: Writes a blog post
//! input: "topic: str"
//! output: "title: str, body: str"
//! evaluator: {type: declarative, temperature: 0.2}
//! modules:
//!   log: {type: logging}
//! handoff_router: {type: default, hand_off: editor}
//! tools: [text::word_count]
//! ```
//!
//! Components are stored as their registry type name plus flattened config.
//! Tools are path references; object identity never crosses this boundary.

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools::ToolReference;

/// A component (evaluator, module or router) by type name and config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl ComponentSpec {
    pub fn new(type_name: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            type_name: type_name.into(),
            config,
        }
    }

    /// A component with empty config
    pub fn of(type_name: impl Into<String>) -> Self {
        Self::new(type_name, Map::new())
    }
}

/// Modules by name, in registration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleSpecs(pub Vec<(String, ComponentSpec)>);

impl ModuleSpecs {
    pub fn iter(&self) -> impl Iterator<Item = &(String, ComponentSpec)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ModuleSpecs {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, spec) in &self.0 {
            map.serialize_entry(name, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ModuleSpecs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // serde_json's Map keeps insertion order with `preserve_order`
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(name, value)| {
                serde_json::from_value(value)
                    .map(|spec| (name, spec))
                    .map_err(serde::de::Error::custom)
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(ModuleSpecs)
    }
}

/// Serializable definition of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub input: String,

    #[serde(default)]
    pub output: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<ComponentSpec>,

    #[serde(default, skip_serializing_if = "ModuleSpecs::is_empty")]
    pub modules: ModuleSpecs,

    #[serde(default)]
    pub handoff_router: Option<ComponentSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolReference>,
}

/// Serializable definition of a whole flock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlockSpec {
    #[serde(default = "default_flock_name")]
    pub name: String,

    /// Model for agents that do not set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Agent a run starts from when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_agent: Option<String>,

    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

fn default_flock_name() -> String {
    "flock".to_string()
}

impl FlockSpec {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_yaml(&self) -> crate::error::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.name == name)
    }
}
