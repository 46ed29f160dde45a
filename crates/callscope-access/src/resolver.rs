//! Account scope resolution
//!
//! [`resolve`] is the only place that decides which account filter applies.
//! It is pure: given the user, the accounts they may see and the requested
//! scope, it returns a [`Resolution`] that every query and AI prompt is
//! derived from.
//!
//! # Rules
//!
//! 1. No accounts: [`EffectiveScope::NoAccounts`].
//! 2. One account: pinned to it, whatever was requested.
//! 3. Several accounts:
//!    - `"all"` only for superAdmin, otherwise the first account
//!    - a concrete id only if assigned, otherwise the first account
//!    - nothing requested: `"all"` for superAdmin, otherwise the first account
//!
//! A request that could not be honoured is recorded as the downgrade reason
//! so callers can tell the difference between "granted" and "corrected".

use callscope_core::{Account, AccountId, Role, ScopeError, SelectedScope, User, UserId};
use serde::Serialize;
use std::fmt;

/// Account filter every downstream query is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "accountId")]
pub enum EffectiveScope {
    /// Rows of one account only
    Account(AccountId),
    /// Every account; superAdmin only
    AllAccounts,
    /// User has no accounts; queries return nothing
    NoAccounts,
}

impl EffectiveScope {
    /// Concrete account filter, if any
    #[inline]
    #[must_use]
    pub fn account(&self) -> Option<AccountId> {
        match self {
            EffectiveScope::Account(id) => Some(*id),
            _ => None,
        }
    }

    /// Whether a row owned by `account` is visible under this scope
    #[inline]
    #[must_use]
    pub fn admits(&self, account: AccountId) -> bool {
        match self {
            EffectiveScope::Account(id) => *id == account,
            EffectiveScope::AllAccounts => true,
            EffectiveScope::NoAccounts => false,
        }
    }
}

impl fmt::Display for EffectiveScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectiveScope::Account(id) => write!(f, "account:{id}"),
            EffectiveScope::AllAccounts => f.write_str("all-accounts"),
            EffectiveScope::NoAccounts => f.write_str("no-accounts"),
        }
    }
}

/// Outcome of scope resolution
///
/// Only [`resolve`] constructs this type, so holding one proves the effective
/// scope went through the rules above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    user_id: UserId,
    role: Role,
    accounts: Vec<Account>,
    requested: Option<SelectedScope>,
    effective: EffectiveScope,
    downgrade: Option<ScopeError>,
}

impl Resolution {
    #[inline]
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[inline]
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Accounts the user may select, in display order
    #[inline]
    #[must_use]
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// What the client asked for
    #[inline]
    #[must_use]
    pub fn requested(&self) -> Option<SelectedScope> {
        self.requested
    }

    /// What actually applies
    #[inline]
    #[must_use]
    pub fn effective(&self) -> EffectiveScope {
        self.effective
    }

    /// Why the request was not honoured, if it was not
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> Option<ScopeError> {
        self.downgrade
    }

    #[inline]
    #[must_use]
    pub fn is_downgraded(&self) -> bool {
        self.downgrade.is_some()
    }

    /// Scope to remember as the next load's hint
    #[must_use]
    pub fn selected(&self) -> Option<SelectedScope> {
        match self.effective {
            EffectiveScope::Account(id) => Some(SelectedScope::Account(id)),
            EffectiveScope::AllAccounts => Some(SelectedScope::All),
            EffectiveScope::NoAccounts => None,
        }
    }

    /// Display name of an account in this resolution
    #[must_use]
    pub fn account_name(&self, id: AccountId) -> Option<&str> {
        self.accounts
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.name.as_str())
    }

    /// Human-readable description of the effective scope
    #[must_use]
    pub fn describe(&self) -> String {
        match self.effective {
            EffectiveScope::Account(id) => match self.account_name(id) {
                Some(name) => format!("account \"{name}\" ({id})"),
                None => format!("account {id}"),
            },
            EffectiveScope::AllAccounts => "all accounts".to_string(),
            EffectiveScope::NoAccounts => "no accounts".to_string(),
        }
    }
}

/// Resolve the effective scope for `user`
///
/// `accounts` is the set the user may see, in display order. `requested` is
/// the client's selection or remembered hint; `None` applies the load default.
#[must_use]
pub fn resolve(user: &User, accounts: &[Account], requested: Option<SelectedScope>) -> Resolution {
    let (effective, downgrade) = match accounts {
        [] => (EffectiveScope::NoAccounts, requested.map(|_| ScopeError::NoAccounts)),
        [only] => {
            let downgrade = match requested {
                Some(SelectedScope::All) if !user.role.can_view_all_accounts() => {
                    Some(ScopeError::IllegalAllRequest)
                }
                Some(SelectedScope::Account(id)) if id != only.id => {
                    Some(ScopeError::UnassignedAccountRequest)
                }
                _ => None,
            };
            (EffectiveScope::Account(only.id), downgrade)
        }
        [first, ..] => {
            let fallback = EffectiveScope::Account(first.id);
            match requested {
                None if user.role.can_view_all_accounts() => (EffectiveScope::AllAccounts, None),
                None => (fallback, None),
                Some(SelectedScope::All) if user.role.can_view_all_accounts() => {
                    (EffectiveScope::AllAccounts, None)
                }
                Some(SelectedScope::All) => (fallback, Some(ScopeError::IllegalAllRequest)),
                Some(SelectedScope::Account(id)) if accounts.iter().any(|a| a.id == id) => {
                    (EffectiveScope::Account(id), None)
                }
                Some(SelectedScope::Account(_)) => {
                    (fallback, Some(ScopeError::UnassignedAccountRequest))
                }
            }
        }
    };

    if let Some(reason) = downgrade {
        tracing::warn!(
            user = %user.id,
            role = %user.role,
            requested = ?requested.map(|s| s.to_string()),
            effective = %effective,
            %reason,
            "scope request downgraded"
        );
    } else {
        tracing::debug!(user = %user.id, effective = %effective, "scope resolved");
    }

    Resolution {
        user_id: user.id,
        role: user.role,
        accounts: accounts.to_vec(),
        requested,
        effective,
        downgrade,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn accounts(names: &[&str]) -> Vec<Account> {
        names.iter().map(|n| Account::new(*n, Utc::now())).collect()
    }

    #[test]
    fn agent_requesting_all_is_downgraded_to_first_account() {
        let agent = User::new(Role::Agent, "agent");
        let assigned = accounts(&["X", "Y"]);

        let res = resolve(&agent, &assigned, Some(SelectedScope::All));

        assert_eq!(res.effective(), EffectiveScope::Account(assigned[0].id));
        assert_eq!(res.downgrade(), Some(ScopeError::IllegalAllRequest));
        assert!(res.is_downgraded());
        assert_eq!(res.selected(), Some(SelectedScope::Account(assigned[0].id)));
    }

    #[test]
    fn super_admin_requesting_all_gets_all() {
        let admin = User::new(Role::SuperAdmin, "root");
        let assigned = accounts(&["X", "Y", "Z"]);

        let res = resolve(&admin, &assigned, Some(SelectedScope::All));

        assert_eq!(res.effective(), EffectiveScope::AllAccounts);
        assert!(!res.is_downgraded());
        assert_eq!(res.selected(), Some(SelectedScope::All));
    }

    #[test]
    fn single_account_is_pinned() {
        let admin = User::new(Role::SuperAdmin, "root");
        let assigned = accounts(&["X"]);

        let res = resolve(&admin, &assigned, Some(SelectedScope::All));
        assert_eq!(res.effective(), EffectiveScope::Account(assigned[0].id));
        assert!(!res.is_downgraded());
    }

    #[test]
    fn revoked_hint_falls_back_to_assigned_account() {
        let qa = User::new(Role::QualityAnalyst, "qa");
        let assigned = accounts(&["X", "Z"]);
        let revoked = AccountId::new();

        let res = resolve(&qa, &assigned, Some(SelectedScope::Account(revoked)));

        assert_eq!(res.effective(), EffectiveScope::Account(assigned[0].id));
        assert_eq!(res.downgrade(), Some(ScopeError::UnassignedAccountRequest));
    }

    #[test]
    fn no_accounts_is_terminal() {
        let sup = User::new(Role::Supervisor, "sup");
        let res = resolve(&sup, &[], Some(SelectedScope::All));
        assert_eq!(res.effective(), EffectiveScope::NoAccounts);
        assert_eq!(res.selected(), None);

        let res = resolve(&sup, &[], None);
        assert_eq!(res.effective(), EffectiveScope::NoAccounts);
        assert!(!res.is_downgraded());
    }

    #[test]
    fn load_defaults() {
        let assigned = accounts(&["X", "Y"]);

        let root = resolve(&User::new(Role::SuperAdmin, "root"), &assigned, None);
        assert_eq!(root.effective(), EffectiveScope::AllAccounts);

        let admin = resolve(&User::new(Role::Admin, "admin"), &assigned, None);
        assert_eq!(admin.effective(), EffectiveScope::Account(assigned[0].id));
    }

    #[test]
    fn describe_names_the_account() {
        let assigned = accounts(&["Acme Support"]);
        let res = resolve(&User::new(Role::Agent, "a"), &assigned, None);
        assert!(res.describe().contains("Acme Support"));
    }

    fn role_strategy() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Admin),
            Just(Role::QualityAnalyst),
            Just(Role::Supervisor),
            Just(Role::Agent),
        ]
    }

    proptest! {
        #[test]
        fn prop_non_super_admin_scope_is_always_assigned(
            role in role_strategy(),
            n_accounts in 0usize..6,
            pick in proptest::option::of(0usize..8),
            ask_all in any::<bool>(),
        ) {
            let user = User::new(role, "u");
            let assigned: Vec<Account> = (0..n_accounts)
                .map(|i| Account::new(format!("acct-{i}"), Utc::now()))
                .collect();
            let requested = match (ask_all, pick) {
                (true, _) => Some(SelectedScope::All),
                (false, Some(i)) if i < assigned.len() => Some(SelectedScope::Account(assigned[i].id)),
                (false, Some(_)) => Some(SelectedScope::Account(AccountId::new())),
                (false, None) => None,
            };

            let res = resolve(&user, &assigned, requested);

            match res.effective() {
                EffectiveScope::AllAccounts => prop_assert!(false, "non-superAdmin resolved to all"),
                EffectiveScope::Account(id) => prop_assert!(assigned.iter().any(|a| a.id == id)),
                EffectiveScope::NoAccounts => prop_assert!(assigned.is_empty()),
            }
        }

        #[test]
        fn prop_single_account_pins_every_request(
            role in prop_oneof![Just(Role::SuperAdmin), role_strategy()],
            ask_all in any::<bool>(),
        ) {
            let user = User::new(role, "u");
            let only = Account::new("only", Utc::now());
            let requested = if ask_all {
                Some(SelectedScope::All)
            } else {
                Some(SelectedScope::Account(AccountId::new()))
            };

            let res = resolve(&user, std::slice::from_ref(&only), requested);
            prop_assert_eq!(res.effective(), EffectiveScope::Account(only.id));
        }
    }
}
