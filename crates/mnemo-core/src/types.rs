//! Core types for Mnemo

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

pub const DEFAULT_ROLE: &str = "reflection";
pub const DEFAULT_UNIT_NAME: &str = "unknown";
pub const DEFAULT_REASONING_MODE: &str = "none";

/// Role stamped on every user/agent interaction.
pub const MESSAGE_ROLE: &str = "message";
pub const USER_UNIT: &str = "User";
pub const AGENT_UNIT: &str = "ReasoningUnit";

/// Opaque memory identifier (`mem-` + 8 hex chars).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Fresh random id. Uniqueness within a store is enforced by the store.
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("mem-{}", &hex[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemoryId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for MemoryId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Internal,
    External,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Internal => "internal",
            MemoryKind::External => "external",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "internal" => Ok(MemoryKind::Internal),
            "external" => Ok(MemoryKind::External),
            other => Err(format!("unknown memory kind: {}", other)),
        }
    }
}

/// Recall priority, highest first.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriorityLevel {
    Core,
    High,
    Medium,
    Low,
    Background,
}

impl PriorityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityLevel::Core => "CORE",
            PriorityLevel::High => "HIGH",
            PriorityLevel::Medium => "MEDIUM",
            PriorityLevel::Low => "LOW",
            PriorityLevel::Background => "BACKGROUND",
        }
    }

    /// Parse leniently; anything unrecognized becomes `Background`.
    pub fn parse_or_background(s: Option<&str>) -> Self {
        s.and_then(|s| s.parse().ok()).unwrap_or(PriorityLevel::Background)
    }
}

impl FromStr for PriorityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CORE" => Ok(PriorityLevel::Core),
            "HIGH" => Ok(PriorityLevel::High),
            "MEDIUM" => Ok(PriorityLevel::Medium),
            "LOW" => Ok(PriorityLevel::Low),
            "BACKGROUND" => Ok(PriorityLevel::Background),
            other => Err(format!("unknown priority level: {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TemporalScope {
    #[default]
    ShortTerm,
    LongTerm,
}

impl TemporalScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalScope::ShortTerm => "short_term",
            TemporalScope::LongTerm => "long_term",
        }
    }

    /// Parse leniently; anything unrecognized becomes `ShortTerm`.
    pub fn parse_or_short(s: Option<&str>) -> Self {
        s.and_then(|s| s.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for TemporalScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short_term" | "shortterm" => Ok(TemporalScope::ShortTerm),
            "long_term" | "longterm" => Ok(TemporalScope::LongTerm),
            other => Err(format!("unknown temporal scope: {}", other)),
        }
    }
}

/// Reflection mode. Also restricts which tools a cycle may run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReflectionMode {
    Quick,
    Deep,
    Migration,
}

impl ReflectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflectionMode::Quick => "quick",
            ReflectionMode::Deep => "deep",
            ReflectionMode::Migration => "migration",
        }
    }
}

impl std::fmt::Display for ReflectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored an interaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractionRole {
    User,
    Agent,
}

impl InteractionRole {
    pub fn unit_name(&self) -> &'static str {
        match self {
            InteractionRole::User => USER_UNIT,
            InteractionRole::Agent => AGENT_UNIT,
        }
    }
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

fn default_unit_name() -> String {
    DEFAULT_UNIT_NAME.to_string()
}

fn default_reasoning_mode() -> String {
    DEFAULT_REASONING_MODE.to_string()
}

/// Metadata keys backed by a typed field. Never stored in `extra`.
pub const RESERVED_METADATA_KEYS: [&str; 6] = [
    "role",
    "unit_name",
    "priority_level",
    "temporal_scope",
    "recalled",
    "reasoning_mode",
];

/// Memory metadata. Known keys are fields; anything else lives in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default = "default_unit_name")]
    pub unit_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_level: Option<PriorityLevel>,
    #[serde(default)]
    pub temporal_scope: TemporalScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recalled: Option<bool>,
    #[serde(default = "default_reasoning_mode")]
    pub reasoning_mode: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self::from_patch(MetadataPatch::default())
    }
}

impl Metadata {
    /// Build metadata from a patch, filling defaults for absent keys.
    pub fn from_patch(patch: MetadataPatch) -> Self {
        let patch = patch.normalized();
        Self {
            role: patch.role.unwrap_or_else(default_role),
            unit_name: patch.unit_name.unwrap_or_else(default_unit_name),
            priority_level: patch.priority_level,
            temporal_scope: patch.temporal_scope.unwrap_or_default(),
            recalled: patch.recalled,
            reasoning_mode: patch.reasoning_mode.unwrap_or_else(default_reasoning_mode),
            extra: patch.extra,
        }
    }

    /// Merge a patch in. Keys the patch does not mention survive.
    pub fn merge(&mut self, patch: MetadataPatch) {
        let patch = patch.normalized();
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(unit_name) = patch.unit_name {
            self.unit_name = unit_name;
        }
        if let Some(priority) = patch.priority_level {
            self.priority_level = Some(priority);
        }
        if let Some(scope) = patch.temporal_scope {
            self.temporal_scope = scope;
        }
        if let Some(recalled) = patch.recalled {
            self.recalled = Some(recalled);
        }
        if let Some(mode) = patch.reasoning_mode {
            self.reasoning_mode = mode;
        }
        self.extra.extend(patch.extra);
    }

    /// Fold `extra` entries that shadow a typed field into that field.
    /// Flattened serialization would otherwise emit the key twice.
    pub fn normalize(&mut self) {
        if !self.extra.keys().any(|k| is_reserved(k)) {
            return;
        }
        let extra = std::mem::take(&mut self.extra);
        let patch = extra
            .into_iter()
            .fold(MetadataPatch::new(), |p, (k, v)| p.extra(k, v));
        self.merge(patch);
    }

    /// Look up a key as JSON. Absent keys are `null`.
    pub fn field(&self, key: &str) -> Value {
        match key {
            "role" => Value::String(self.role.clone()),
            "unit_name" => Value::String(self.unit_name.clone()),
            "priority_level" => self
                .priority_level
                .map(|p| Value::String(p.as_str().to_string()))
                .unwrap_or(Value::Null),
            "temporal_scope" => Value::String(self.temporal_scope.as_str().to_string()),
            "recalled" => self.recalled.map(Value::Bool).unwrap_or(Value::Null),
            "reasoning_mode" => Value::String(self.reasoning_mode.clone()),
            other => self.extra.get(other).cloned().unwrap_or(Value::Null),
        }
    }
}

/// Partial metadata: creation input and update patch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_level: Option<PriorityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_scope: Option<TemporalScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recalled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_mode: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl MetadataPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn unit_name(mut self, unit_name: impl Into<String>) -> Self {
        self.unit_name = Some(unit_name.into());
        self
    }

    pub fn priority(mut self, priority: PriorityLevel) -> Self {
        self.priority_level = Some(priority);
        self
    }

    pub fn scope(mut self, scope: TemporalScope) -> Self {
        self.temporal_scope = Some(scope);
        self
    }

    pub fn recalled(mut self, recalled: bool) -> Self {
        self.recalled = Some(recalled);
        self
    }

    pub fn reasoning_mode(mut self, mode: impl Into<String>) -> Self {
        self.reasoning_mode = Some(mode.into());
        self
    }

    /// Set an open key. Keys with a typed field are routed to that field;
    /// values that do not parse for it are dropped.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key.into(), value.into());
        self
    }

    fn set(&mut self, key: String, value: Value) {
        match key.as_str() {
            "role" => self.role = text(value).or(self.role.take()),
            "unit_name" => self.unit_name = text(value).or(self.unit_name.take()),
            "reasoning_mode" => self.reasoning_mode = text(value).or(self.reasoning_mode.take()),
            "priority_level" => {
                if let Some(p) = text(value).and_then(|s| s.parse().ok()) {
                    self.priority_level = Some(p);
                }
            }
            "temporal_scope" => {
                if let Some(s) = text(value).and_then(|s| s.parse().ok()) {
                    self.temporal_scope = Some(s);
                }
            }
            "recalled" => {
                if let Some(b) = value.as_bool() {
                    self.recalled = Some(b);
                }
            }
            _ => {
                self.extra.insert(key, value);
            }
        }
    }

    /// Move reserved keys out of `extra` (it is public and deserialized as-is).
    fn normalized(mut self) -> Self {
        let shadowed: Vec<String> = self.extra.keys().filter(|k| is_reserved(k)).cloned().collect();
        for key in shadowed {
            if let Some(value) = self.extra.remove(&key) {
                self.set(key, value);
            }
        }
        self
    }
}

fn is_reserved(key: &str) -> bool {
    RESERVED_METADATA_KEYS.contains(&key)
}

fn text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// An atomic memory record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub kind: MemoryKind,
    pub content: String,
    pub metadata: Metadata,
    /// Epoch seconds.
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub parent_ids: BTreeSet<MemoryId>,
}

impl Memory {
    /// New memory with a fresh id, defaulted metadata, and the current time.
    pub fn new(kind: MemoryKind, content: impl Into<String>, metadata: MetadataPatch) -> Self {
        Self {
            id: MemoryId::generate(),
            kind,
            content: content.into(),
            metadata: Metadata::from_patch(metadata),
            timestamp: now_timestamp(),
            parent_ids: BTreeSet::new(),
        }
    }

    pub fn with_parents(mut self, parents: impl IntoIterator<Item = MemoryId>) -> Self {
        self.parent_ids.extend(parents);
        self
    }

    pub fn is_recalled(&self) -> bool {
        self.metadata.recalled == Some(true)
    }

    fn is_message_from(&self, unit: &str) -> bool {
        self.metadata.role == MESSAGE_ROLE && self.metadata.unit_name == unit
    }

    pub fn is_user_input(&self) -> bool {
        self.kind == MemoryKind::External && self.is_message_from(USER_UNIT)
    }

    pub fn is_agent_output(&self) -> bool {
        self.is_message_from(AGENT_UNIT)
    }
}

/// Tool description handed to the reasoner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One action proposed by the reasoner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

impl Action {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Current time in epoch seconds with millisecond resolution.
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
