//! Stored authentication session.
//!
//! The session is written by the authentication collaborator; this client
//! only reads it. It mirrors the two browser storage keys of the web client,
//! `authToken` and `currentUser`.

use std::{io::ErrorKind, path::Path};

use serde::{Deserialize, Serialize};

use crate::{error::CredentialError, types::UserId};

/// Environment variable holding the bearer token
pub const TOKEN_ENV: &str = "DENGON_AUTH_TOKEN";
/// Environment variable holding the current user's id
pub const USER_ID_ENV: &str = "DENGON_USER_ID";

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub current_user: Option<CurrentUser>,
}

impl StoredSession {
    /// Read a session file. A missing file is an empty session.
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No session file at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the session from `DENGON_AUTH_TOKEN` and `DENGON_USER_ID`.
    pub fn from_env() -> Result<Self, CredentialError> {
        Self::from_values(
            std::env::var(TOKEN_ENV).ok(),
            std::env::var(USER_ID_ENV).ok(),
        )
    }

    fn from_values(token: Option<String>, user_id: Option<String>) -> Result<Self, CredentialError> {
        let current_user = user_id
            .map(|value| {
                value
                    .parse::<UserId>()
                    .map(|id| CurrentUser {
                        id,
                        username: None,
                        full_name: None,
                    })
                    .map_err(|_| CredentialError::InvalidValue {
                        name: USER_ID_ENV,
                        value,
                    })
            })
            .transpose()?;
        Ok(Self {
            auth_token: token,
            current_user,
        })
    }

    /// Fill fields missing here from `fallback`.
    pub fn or(self, fallback: StoredSession) -> Self {
        Self {
            auth_token: self.auth_token.or(fallback.auth_token),
            current_user: self.current_user.or(fallback.current_user),
        }
    }

    /// The bearer token, if one is stored and non-empty
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn current_user(&self) -> Option<&CurrentUser> {
        self.current_user.as_ref()
    }
}
