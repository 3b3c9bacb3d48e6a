//! Persisted session pair.
//!
//! The credential and the serialized identity are always written and
//! removed together, inside one transaction.

use rusqlite::{params, OptionalExtension};
use tracing::warn;

use super::{Database, DbResult};
use crate::models::{Credential, Identity, Session};

/// Key holding the bearer credential.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Key holding the JSON-serialized identity.
pub const AUTH_USER_KEY: &str = "auth_user";

impl Database {
    /// Persist credential and identity together.
    pub fn save_session(&mut self, session: &Session) -> DbResult<()> {
        let identity_json = serde_json::to_string(&session.identity)?;

        let tx = self.conn.transaction()?;
        for (key, value) in [
            (AUTH_TOKEN_KEY, session.credential.as_str()),
            (AUTH_USER_KEY, identity_json.as_str()),
        ] {
            tx.execute(
                "INSERT OR REPLACE INTO kv_state (key, value, updated_at) VALUES (?, ?, datetime('now'))",
                params![key, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Load the persisted pair. A lone key or an unreadable identity counts as absent.
    pub fn load_session(&self) -> DbResult<Option<Session>> {
        let token = self.get_state(AUTH_TOKEN_KEY)?;
        let user = self.get_state(AUTH_USER_KEY)?;

        let (token, user) = match (token, user) {
            (Some(token), Some(user)) => (token, user),
            (None, None) => return Ok(None),
            _ => {
                warn!("Persisted session is incomplete, ignoring it");
                return Ok(None);
            }
        };

        match serde_json::from_str::<Identity>(&user) {
            Ok(identity) => Ok(Some(Session {
                credential: Credential::new(token),
                identity,
            })),
            Err(e) => {
                warn!(error = %e, "Persisted identity is unreadable, ignoring it");
                Ok(None)
            }
        }
    }

    /// Remove both keys. Returns whether anything was stored.
    pub fn clear_session(&mut self) -> DbResult<bool> {
        let tx = self.conn.transaction()?;
        let mut removed = 0;
        for key in [AUTH_TOKEN_KEY, AUTH_USER_KEY] {
            removed += tx.execute("DELETE FROM kv_state WHERE key = ?", [key])?;
        }
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Whether any session key is present (used to check the pair invariant).
    pub fn has_session_keys(&self) -> DbResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM kv_state WHERE key IN (?, ?) LIMIT 1",
                params![AUTH_TOKEN_KEY, AUTH_USER_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
