//! Callscope Core
//!
//! Shared vocabulary for the account-scoped access layer:
//! - Identity types (users, roles, sessions)
//! - Tenant types (accounts, assignments, selected scope)
//! - Domain rows read through the scoped query builder
//! - Error taxonomy and localized user-facing messages
//! - Configuration, clock and telemetry setup
//!
//! # Example
//!
//! ```rust,ignore
//! use callscope_core::prelude::*;
//!
//! let config = CallscopeConfig::from_toml_str(include_str!("callscope.toml"))?;
//! callscope_core::telemetry::init(&config.log)?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod messages;
pub mod records;
pub mod telemetry;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CallscopeConfig, ConfigError, ContextConfig, DirectoryConfig, LlmConfig, LogConfig,
    QueryConfig, RouteConfig, SessionConfig,
};
pub use error::{AuthError, CallscopeError, QueryError, ScopeError, ValidationError};
pub use messages::{auth_message, query_message};
pub use records::{
    AccountScoped, BehaviorRecord, CallId, CallRecord, FeedbackRecord, PromptRecord, Table,
};
pub use types::{
    Account, AccountId, AccountStatus, Language, Role, SelectedScope, Session, User,
    UserAccountAssignment, UserId,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Callscope
    pub use crate::{
        Account, AccountId, AccountScoped, AccountStatus, AuthError, CallscopeConfig,
        CallscopeError, Clock, QueryError, Role, ScopeError, SelectedScope, Session, Table, User,
        UserId, ValidationError,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
