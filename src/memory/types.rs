//! Core record types.
//!
//! Defines [`MemoryType`] (the six memory categories), [`Memory`] and
//! [`EpisodeMemory`] (immutable records), [`RelationshipMetrics`] (the
//! per-partner counters) and the collaborator rows [`Partner`] and [`Message`].

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Category of an extracted memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// General conversation content.
    Conversation,
    /// Durable facts about the user (job, family, places).
    Fact,
    Emotion,
    /// Something that happened or is going to happen.
    Event,
    /// People and social ties.
    Relationship,
    /// Likes, dislikes, hobbies and values.
    Preference,
}

impl MemoryType {
    pub const ALL: [MemoryType; 6] = [
        Self::Conversation,
        Self::Fact,
        Self::Emotion,
        Self::Event,
        Self::Relationship,
        Self::Preference,
    ];

    /// Types that feed continuing-topic clustering.
    pub const TOPICAL: [MemoryType; 3] = [Self::Conversation, Self::Preference, Self::Relationship];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Fact => "fact",
            Self::Emotion => "emotion",
            Self::Event => "event",
            Self::Relationship => "relationship",
            Self::Preference => "preference",
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "conversation" => Ok(Self::Conversation),
            "fact" => Ok(Self::Fact),
            "emotion" => Ok(Self::Emotion),
            "event" => Ok(Self::Event),
            "relationship" => Ok(Self::Relationship),
            "preference" => Ok(Self::Preference),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

/// Granularity hint passed to the extraction prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    #[default]
    Daily,
    Weekly,
    Important,
    Episode,
}

impl SummaryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Important => "important",
            Self::Episode => "episode",
        }
    }
}

impl std::str::FromStr for SummaryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "important" => Ok(Self::Important),
            "episode" => Ok(Self::Episode),
            _ => Err(format!("unknown summary type: {s}")),
        }
    }
}

/// A persisted memory, matching the `memories` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Memory {
    /// UUID v7 primary key.
    pub id: String,
    pub partner_id: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub content: String,
    /// Embedding of `content`. Empty when embedding failed, which is a valid
    /// permanent state.
    #[serde(skip)]
    pub vector: Vec<f32>,
    /// Clamped to `[0, 10]`.
    pub importance: f64,
    /// Clamped to `[-10, 10]`.
    pub emotional_weight: f64,
    pub tags: Vec<String>,
    pub related_people: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for a memory insert. Values are normalized by [`NewMemory::normalized`]
/// before they reach the database.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub partner_id: String,
    pub memory_type: MemoryType,
    pub content: String,
    pub vector: Vec<f32>,
    pub importance: f64,
    pub emotional_weight: f64,
    pub tags: Vec<String>,
    pub related_people: Vec<String>,
    /// Defaults to now.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewMemory {
    pub fn new(partner_id: impl Into<String>, memory_type: MemoryType, content: impl Into<String>) -> Self {
        Self {
            partner_id: partner_id.into(),
            memory_type,
            content: content.into(),
            vector: Vec::new(),
            importance: 5.0,
            emotional_weight: 0.0,
            tags: Vec::new(),
            related_people: Vec::new(),
            created_at: None,
        }
    }

    /// Clamp importance to `[0, 10]`, emotional weight to `[-10, 10]` and drop
    /// duplicate tags (first occurrence wins).
    pub fn normalized(mut self) -> Self {
        self.importance = clamp_level(self.importance, 0.0, 10.0);
        self.emotional_weight = clamp_level(self.emotional_weight, -10.0, 10.0);
        self.tags = dedup_tags(self.tags);
        self
    }
}

/// A persisted episode, matching the `episode_memories` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeMemory {
    pub id: String,
    pub partner_id: String,
    pub title: String,
    pub description: String,
    /// Clamped to `[0, 10]`.
    pub emotional_weight: f64,
    pub tags: Vec<String>,
    pub participants: Vec<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEpisode {
    pub partner_id: String,
    pub title: String,
    pub description: String,
    pub emotional_weight: f64,
    pub tags: Vec<String>,
    pub participants: Vec<String>,
    /// Defaults to now.
    pub date: Option<DateTime<Utc>>,
}

impl NewEpisode {
    pub fn normalized(mut self) -> Self {
        self.emotional_weight = clamp_level(self.emotional_weight, 0.0, 10.0);
        self.tags = dedup_tags(self.tags);
        self
    }
}

/// Per-partner relationship counters, one row per partner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipMetrics {
    pub partner_id: String,
    /// `[0, 100]`.
    pub intimacy_level: f64,
    pub trust_level: Option<f64>,
    pub emotional_connection: Option<f64>,
    pub conversation_frequency: i64,
    pub shared_memories: i64,
    pub last_interaction: DateTime<Utc>,
}

/// Relationship stage derived from the intimacy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStage {
    Stranger,
    Acquaintance,
    Friend,
    CloseFriend,
    Intimate,
}

impl RelationshipStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stranger => "stranger",
            Self::Acquaintance => "acquaintance",
            Self::Friend => "friend",
            Self::CloseFriend => "close_friend",
            Self::Intimate => "intimate",
        }
    }
}

impl std::fmt::Display for RelationshipStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A companion owned by a user. Collaborator row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Partner {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    User,
    Partner,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Partner => "partner",
        }
    }
}

impl std::str::FromStr for MessageSender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "partner" => Ok(Self::Partner),
            _ => Err(format!("unknown message sender: {s}")),
        }
    }
}

/// A single chat turn. Collaborator row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub partner_id: String,
    pub sender: MessageSender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a continuing topic, by age of its latest mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Active,
    Dormant,
    Resolved,
}

impl TopicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dormant => "dormant",
            Self::Resolved => "resolved",
        }
    }
}

/// Status filter for topic queries. `All` passes every topic through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicFilter {
    #[default]
    Active,
    Dormant,
    Resolved,
    All,
}

impl TopicFilter {
    pub fn matches(&self, status: TopicStatus) -> bool {
        match self {
            Self::All => true,
            Self::Active => status == TopicStatus::Active,
            Self::Dormant => status == TopicStatus::Dormant,
            Self::Resolved => status == TopicStatus::Resolved,
        }
    }
}

impl std::str::FromStr for TopicFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "dormant" => Ok(Self::Dormant),
            "resolved" => Ok(Self::Resolved),
            "all" => Ok(Self::All),
            _ => Err(format!("unknown topic status: {s}")),
        }
    }
}

/// A derived cluster of memories sharing a tag. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuingTopic {
    pub id: String,
    pub partner_id: String,
    pub title: String,
    pub description: String,
    pub status: TopicStatus,
    pub importance: f64,
    pub last_mentioned: DateTime<Utc>,
    pub related_memories: Vec<Memory>,
}

/// Clamp a level into `[lo, hi]`, mapping NaN to the value nearest zero.
pub fn clamp_level(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        0.0_f64.clamp(lo, hi)
    } else {
        value.clamp(lo, hi)
    }
}

/// Drop blank and repeated tags, keeping first occurrences in order.
pub fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Fixed-width RFC 3339 form used for every stored timestamp, so string order
/// matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Returns `None` for unparsable values.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
