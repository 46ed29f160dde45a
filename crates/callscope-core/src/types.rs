//! Identity and tenant types
//!
//! Defines the fundamental types shared by every Callscope crate:
//! - Users and their roles
//! - Accounts (tenants) and user/account assignments
//! - The client-held selected scope
//! - Auth sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generate new user ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique account (tenant) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    /// Generate new account ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// User roles, the sole privilege axis of the scope resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// Platform operator; the only role allowed to see every account at once
    SuperAdmin,
    /// Account administrator
    Admin,
    /// Quality analyst reviewing scored calls
    QualityAnalyst,
    /// Team supervisor
    Supervisor,
    /// Call-center agent
    Agent,
}

impl Role {
    /// Whether the role may select the `"all"` scope
    #[inline]
    #[must_use]
    pub fn can_view_all_accounts(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    /// Whether the role may create accounts, toggle status and manage assignments
    #[inline]
    #[must_use]
    pub fn can_manage_accounts(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }

    /// Wire name of the role
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "superAdmin",
            Role::Admin => "admin",
            Role::QualityAnalyst => "qualityAnalyst",
            Role::Supervisor => "supervisor",
            Role::Agent => "agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UI language used for user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English
    #[default]
    En,
    /// Spanish
    Es,
}

/// Authenticated user profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub role: Role,
    pub display_name: String,
    #[serde(default)]
    pub language: Language,
}

impl User {
    /// Create new user
    #[inline]
    #[must_use]
    pub fn new(role: Role, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            role,
            display_name: display_name.into(),
            language: Language::default(),
        }
    }

    /// With language
    #[inline]
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// With explicit id
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: UserId) -> Self {
        self.id = id;
        self
    }
}

/// Account status; toggling it is the only account mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

/// Tenant account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create new active account
    #[must_use]
    pub fn new(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            name: name.into(),
            status: AccountStatus::Active,
            created_at,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Many-to-many edge between users and accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccountAssignment {
    pub user_id: UserId,
    pub account_id: AccountId,
}

/// Scope requested by the client: one account, or every account
///
/// Serialized as the literal `"all"` or the account UUID, which is also the
/// shape persisted as the scope hint between reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SelectedScope {
    All,
    Account(AccountId),
}

impl SelectedScope {
    /// Literal used for the global scope
    pub const ALL: &'static str = "all";

    /// Concrete account, if any
    #[inline]
    #[must_use]
    pub fn account(&self) -> Option<AccountId> {
        match self {
            SelectedScope::All => None,
            SelectedScope::Account(id) => Some(*id),
        }
    }
}

impl fmt::Display for SelectedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectedScope::All => f.write_str(Self::ALL),
            SelectedScope::Account(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for SelectedScope {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(Self::ALL) {
            Ok(SelectedScope::All)
        } else {
            AccountId::from_str(s).map(SelectedScope::Account)
        }
    }
}

impl TryFrom<String> for SelectedScope {
    type Error = uuid::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SelectedScope> for String {
    fn from(scope: SelectedScope) -> Self {
        scope.to_string()
    }
}

impl From<AccountId> for SelectedScope {
    fn from(id: AccountId) -> Self {
        SelectedScope::Account(id)
    }
}

/// Auth session issued by the provider
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: UserId,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the access token is past its expiry at `now`
    #[inline]
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// Tokens never reach logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
