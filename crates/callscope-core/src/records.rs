//! Domain rows served through the scoped query builder
//!
//! Every row type carries the `account_id` column the builder filters on and
//! names the table it lives in via [`AccountScoped`].

use crate::types::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Domain tables reachable through the scoped query builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Calls,
    Behaviors,
    Prompts,
    Feedback,
}

impl Table {
    /// Table name in the storage service
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Calls => "calls",
            Table::Behaviors => "behaviors",
            Table::Prompts => "prompts",
            Table::Feedback => "feedback",
        }
    }

    /// Every scoped table
    #[must_use]
    pub fn all() -> [Table; 4] {
        [Table::Calls, Table::Behaviors, Table::Prompts, Table::Feedback]
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row owned by exactly one account
pub trait AccountScoped: serde::de::DeserializeOwned + Send + Sync + 'static {
    /// Table the row type is read from
    const TABLE: Table;

    /// Owning account
    fn account_id(&self) -> AccountId;
}

/// Call identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub Uuid);

impl CallId {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transcribed and scored call recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: CallId,
    pub account_id: AccountId,
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
    pub duration_secs: u32,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl AccountScoped for CallRecord {
    const TABLE: Table = Table::Calls;

    fn account_id(&self) -> AccountId {
        self.account_id
    }
}

/// Behavior evaluated on every call of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorRecord {
    pub id: Uuid,
    pub account_id: AccountId,
    pub name: String,
    pub description: String,
    pub active: bool,
}

impl AccountScoped for BehaviorRecord {
    const TABLE: Table = Table::Behaviors;

    fn account_id(&self) -> AccountId {
        self.account_id
    }
}

/// Account-specific analysis prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: Uuid,
    pub account_id: AccountId,
    pub name: String,
    pub content: String,
    pub active: bool,
}

impl AccountScoped for PromptRecord {
    const TABLE: Table = Table::Prompts;

    fn account_id(&self) -> AccountId {
        self.account_id
    }
}

/// Per-behavior evaluation of one call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub account_id: AccountId,
    pub call_id: CallId,
    pub behavior_name: String,
    pub passed: bool,
    #[serde(default)]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AccountScoped for FeedbackRecord {
    const TABLE: Table = Table::Feedback;

    fn account_id(&self) -> AccountId {
        self.account_id
    }
}
