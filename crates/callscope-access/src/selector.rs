//! Scope selector view model
//!
//! Describes what the account selector shows for a resolution. Single-account
//! users get an informational, disabled selector; users without accounts get
//! an explicit "no accounts assigned" state instead of an empty list.

use crate::resolver::{EffectiveScope, Resolution};
use callscope_core::{Language, SelectedScope};
use serde::Serialize;

/// Selector state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectorState {
    /// Nothing to select; show the explicit empty state
    NoAccounts,
    /// One account; shown as a label
    Pinned,
    /// Several options
    Selectable,
}

/// One selectable option
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeOption {
    pub value: SelectedScope,
    pub label: String,
}

/// What the selector renders
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeSelectorView {
    pub state: SelectorState,
    pub options: Vec<ScopeOption>,
    pub selected: Option<SelectedScope>,
    pub enabled: bool,
    pub label: String,
}

impl ScopeSelectorView {
    /// Build the view for a resolution
    #[must_use]
    pub fn for_resolution(resolution: &Resolution, lang: Language) -> Self {
        let accounts = resolution.accounts();

        if accounts.is_empty() {
            return Self {
                state: SelectorState::NoAccounts,
                options: Vec::new(),
                selected: None,
                enabled: false,
                label: match lang {
                    Language::En => "No accounts assigned. Contact your administrator.",
                    Language::Es => "No tienes cuentas asignadas. Contacta a tu administrador.",
                }
                .to_string(),
            };
        }

        let mut options = Vec::with_capacity(accounts.len() + 1);
        if accounts.len() > 1 && resolution.role().can_view_all_accounts() {
            options.push(ScopeOption {
                value: SelectedScope::All,
                label: match lang {
                    Language::En => "All accounts",
                    Language::Es => "Todas las cuentas",
                }
                .to_string(),
            });
        }
        options.extend(accounts.iter().map(|a| ScopeOption {
            value: SelectedScope::Account(a.id),
            label: a.name.clone(),
        }));

        let pinned = accounts.len() == 1;
        let label = match (resolution.effective(), lang) {
            (EffectiveScope::Account(id), Language::En) => {
                format!("Account: {}", resolution.account_name(id).unwrap_or_default())
            }
            (EffectiveScope::Account(id), Language::Es) => {
                format!("Cuenta: {}", resolution.account_name(id).unwrap_or_default())
            }
            (EffectiveScope::AllAccounts, Language::En) => "Account: all".to_string(),
            (EffectiveScope::AllAccounts, Language::Es) => "Cuenta: todas".to_string(),
            (EffectiveScope::NoAccounts, _) => String::new(),
        };

        Self {
            state: if pinned {
                SelectorState::Pinned
            } else {
                SelectorState::Selectable
            },
            options,
            selected: resolution.selected(),
            enabled: !pinned,
            label,
        }
    }
}
