//! Authentication collaborator: resolves opaque client tokens to stable identities.
//!
//! Real deployments plug in an identity service; the bundled [`LocalAuth`]
//! resolver keeps tokens stable for the process lifetime so reconnecting
//! clients land back on the same participant record.

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Stable identifier of an authenticated user.
pub type UserId = Uuid;

/// Resolved identity attached to every room operation.
#[derive(Debug, Clone, Serialize)]
pub struct UserIdentity {
    /// Stable user id.
    pub id: UserId,
    /// Display name shown to the room.
    pub username: String,
    /// Optional avatar reference.
    pub avatar: Option<String>,
}

/// Error raised when a token cannot be resolved.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token was empty, malformed, or unknown.
    #[error("invalid token")]
    InvalidToken,
}

/// Collaborator resolving opaque tokens before any room operation is authorized.
pub trait AuthProvider: Send + Sync {
    /// Resolve a token to a stable identity.
    fn resolve(&self, token: &str) -> BoxFuture<'static, Result<UserIdentity, AuthError>>;
}

/// Development resolver: the token doubles as the display name, with an
/// optional `name|avatar` form. Identities are cached so the same token
/// always maps to the same user id within one process.
#[derive(Debug, Default)]
pub struct LocalAuth {
    known: DashMap<String, UserIdentity>,
}

impl LocalAuth {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuthProvider for LocalAuth {
    fn resolve(&self, token: &str) -> BoxFuture<'static, Result<UserIdentity, AuthError>> {
        let token = token.trim().to_owned();
        if token.is_empty() {
            return Box::pin(async { Err(AuthError::InvalidToken) });
        }

        let identity = self
            .known
            .entry(token.clone())
            .or_insert_with(|| {
                let (username, avatar) = match token.split_once('|') {
                    Some((name, avatar)) => (name.to_owned(), Some(avatar.to_owned())),
                    None => (token.clone(), None),
                };
                UserIdentity {
                    id: Uuid::new_v4(),
                    username,
                    avatar,
                }
            })
            .clone();

        Box::pin(async move { Ok(identity) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_token_resolves_to_same_identity() {
        let auth = LocalAuth::new();
        let first = auth.resolve("ada").await.unwrap();
        let second = auth.resolve("ada").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.username, "ada");
    }

    #[tokio::test]
    async fn avatar_form_is_split() {
        let auth = LocalAuth::new();
        let identity = auth.resolve("grace|hopper.png").await.unwrap();
        assert_eq!(identity.username, "grace");
        assert_eq!(identity.avatar.as_deref(), Some("hopper.png"));
    }

    #[tokio::test]
    async fn empty_token_is_rejected() {
        let auth = LocalAuth::new();
        assert!(auth.resolve("  ").await.is_err());
    }
}
