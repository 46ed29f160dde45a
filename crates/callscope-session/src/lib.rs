//! Callscope Session - identity lifecycle and route protection
//!
//! - Auth provider and local artifact contracts
//! - Session state machine and store
//! - Single-shot expiry notification
//! - Route guard with return-path preservation
//! - Background session watchdog
//!
//! # Example
//!
//! ```rust,ignore
//! use callscope_session::prelude::*;
//!
//! let store = Arc::new(SessionStore::new(provider, local, clock.clone(), expiry));
//! let credentials = Credentials::new("qa@acme.com", &password)?;
//! store.sign_in(&credentials).await?;
//!
//! let guard = RouteGuard::new(config.routes.clone());
//! let nav = guard.after_sign_in();
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod guard;
pub mod notifier;
pub mod provider;
pub mod state;
pub mod store;
pub mod watchdog;

pub use guard::{Navigation, RouteGuard};
pub use notifier::{ExpiryNotifier, Notice, NoticeKind, Notifier, TracingNotifier};
pub use provider::{AuthProvider, Credentials, LocalAuthStore, MemoryLocalAuthStore};
pub use state::{allowed_transitions, validate_transition, SessionState};
pub use store::{SessionSnapshot, SessionStore};
pub use watchdog::{Watchdog, WatchdogAction, WatchdogTask};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with sessions
    pub use crate::{
        AuthProvider, Credentials, ExpiryNotifier, LocalAuthStore, Navigation, RouteGuard,
        SessionSnapshot, SessionState, SessionStore, Watchdog,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
