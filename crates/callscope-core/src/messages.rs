//! Localized user-facing messages
//!
//! Raw provider text never reaches the user; every error is mapped here to an
//! actionable message in the user's language.

use crate::error::{AuthError, QueryError};
use crate::types::{Language, Role};

fn escalation(lang: Language, role: Option<Role>) -> &'static str {
    let privileged = matches!(role, Some(Role::SuperAdmin | Role::Admin));
    match (lang, privileged) {
        (Language::En, true) => "If it keeps happening, contact platform support.",
        (Language::En, false) => "If it keeps happening, ask your account administrator.",
        (Language::Es, true) => "Si el problema persiste, contacta al soporte de la plataforma.",
        (Language::Es, false) => "Si el problema persiste, consulta al administrador de tu cuenta.",
    }
}

/// Message shown for an auth failure
#[must_use]
pub fn auth_message(err: &AuthError, lang: Language, role: Option<Role>) -> String {
    let base = match (err, lang) {
        (AuthError::InvalidCredentials, Language::En) => "Email or password is incorrect.",
        (AuthError::InvalidCredentials, Language::Es) => "El correo o la contraseña no son correctos.",
        (AuthError::EmailUnconfirmed, Language::En) => {
            "Confirm your email address using the link we sent you, then sign in again."
        }
        (AuthError::EmailUnconfirmed, Language::Es) => {
            "Confirma tu correo con el enlace que te enviamos y vuelve a iniciar sesión."
        }
        (AuthError::RateLimited, Language::En) => {
            "Too many attempts. Wait a minute before trying again."
        }
        (AuthError::RateLimited, Language::Es) => {
            "Demasiados intentos. Espera un minuto antes de volver a intentarlo."
        }
        (AuthError::StaleRefreshToken, Language::En) => {
            "Your previous session was cleared. Please sign in again."
        }
        (AuthError::StaleRefreshToken, Language::Es) => {
            "Se limpió tu sesión anterior. Inicia sesión de nuevo."
        }
        (AuthError::SessionExpired, Language::En) => {
            "Your session has expired. Please sign in again."
        }
        (AuthError::SessionExpired, Language::Es) => {
            "Tu sesión ha expirado. Inicia sesión de nuevo."
        }
        (AuthError::SignInInProgress, Language::En) => "Signing you in…",
        (AuthError::SignInInProgress, Language::Es) => "Iniciando sesión…",
        (AuthError::Network(_), Language::En) => {
            "We could not reach the sign-in service. Check your connection."
        }
        (AuthError::Network(_), Language::Es) => {
            "No pudimos conectar con el servicio de acceso. Revisa tu conexión."
        }
        (AuthError::InvalidTransition { .. }, Language::En) => {
            "Something went wrong with your session. Please sign in again."
        }
        (AuthError::InvalidTransition { .. }, Language::Es) => {
            "Algo salió mal con tu sesión. Inicia sesión de nuevo."
        }
    };

    match err {
        AuthError::EmailUnconfirmed | AuthError::RateLimited | AuthError::Network(_) => {
            format!("{base} {}", escalation(lang, role))
        }
        _ => base.to_string(),
    }
}

/// Message shown for a query failure that survived retries
#[must_use]
pub fn query_message(err: &QueryError, lang: Language) -> String {
    let msg = match (err, lang) {
        (QueryError::NetworkTransient(_), Language::En) => {
            "The data service is not responding. Try again in a moment."
        }
        (QueryError::NetworkTransient(_), Language::Es) => {
            "El servicio de datos no responde. Inténtalo de nuevo en un momento."
        }
        (QueryError::AuthorizationDenied(_), Language::En) => {
            "You do not have access to this data."
        }
        (QueryError::AuthorizationDenied(_), Language::Es) => "No tienes acceso a estos datos.",
        (QueryError::NotFound(_), Language::En) => "The requested item no longer exists.",
        (QueryError::NotFound(_), Language::Es) => "El elemento solicitado ya no existe.",
        (QueryError::Superseded { .. }, Language::En) => "Loading data for the selected account…",
        (QueryError::Superseded { .. }, Language::Es) => {
            "Cargando datos de la cuenta seleccionada…"
        }
        (QueryError::Decode(_), Language::En) => "We received data we could not read.",
        (QueryError::Decode(_), Language::Es) => "Recibimos datos que no pudimos leer.",
    };
    msg.to_string()
}
