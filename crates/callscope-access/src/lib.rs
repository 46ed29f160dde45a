//! Callscope Access - tenant isolation layer
//!
//! Decides which account's data a user sees and makes sure every read obeys
//! that decision:
//! - Account directory with cached listings and superAdmin mutations
//! - Pure scope resolver producing a [`Resolution`]
//! - Shared, generation-stamped [`ScopeStore`]
//! - Scoped query builder that injects the account filter into every read
//!
//! # Example
//!
//! ```rust,ignore
//! use callscope_access::prelude::*;
//!
//! let scope = AccountScope::new(directory, hints, store.clone());
//! scope.load(&user).await?;
//!
//! let queries = ScopedQueryBuilder::new(rows, store.clone(), RetryPolicy::default());
//! let calls = queries.recent_calls(20).await?;
//! if let Some(calls) = store.accept(calls) {
//!     render(calls);
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod directory;
pub mod query;
pub mod resolver;
pub mod retry;
pub mod scope_store;
pub mod selector;

pub use directory::{AccountDirectory, AccountStore, DirectoryError};
pub use query::{
    DomainQuery, Filter, Order, RowStore, ScopeOutcome, ScopedQuery, ScopedQueryBuilder,
    ACCOUNT_COLUMN,
};
pub use resolver::{resolve, EffectiveScope, Resolution};
pub use retry::RetryPolicy;
pub use scope_store::{
    AccountScope, Binding, MemoryHintStore, ScopeHintStore, ScopeSnapshot, ScopeStore, Scoped,
};
pub use selector::{ScopeOption, ScopeSelectorView, SelectorState};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with scoped access
    pub use crate::{
        resolve, AccountDirectory, AccountScope, DomainQuery, EffectiveScope, Filter,
        Resolution, RetryPolicy, RowStore, ScopeStore, Scoped, ScopedQuery, ScopedQueryBuilder,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
