use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::core::error::Result;

/// On-disk shape: a two-key JSON object so the file stays greppable and the
/// keys match what the backend hands out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(rename = "access_token", skip_serializing_if = "Option::is_none")]
    access: Option<String>,
    #[serde(rename = "refresh_token", skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
}

/// File-backed store for the access/refresh token pair. Tokens survive
/// process restarts; reads never fail (a missing or corrupt file reads as
/// "no tokens").
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn access(&self) -> Option<String> {
        self.read().access
    }

    pub fn refresh(&self) -> Option<String> {
        self.read().refresh
    }

    pub fn set_tokens(&self, access: &str, refresh: &str) -> Result<()> {
        self.write(&StoredTokens {
            access: Some(access.to_string()),
            refresh: Some(refresh.to_string()),
        })
    }

    /// Remove both tokens. Idempotent.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// True only for a stored, well-formed access token whose `exp` claim is
    /// strictly in the future. Absent, malformed, or expired tokens all read
    /// as invalid rather than erroring.
    pub fn has_valid_token(&self) -> bool {
        let Some(token) = self.access() else {
            return false;
        };
        match token_expiry(&token) {
            Some(exp) => chrono::Utc::now().timestamp() < exp,
            None => false,
        }
    }

    fn read(&self) -> StoredTokens {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return StoredTokens::default();
        };
        match serde_json::from_str(&raw) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("ignoring corrupt token file {}: {}", self.path.display(), e);
                StoredTokens::default()
            }
        }
    }

    fn write(&self, tokens: &StoredTokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(tokens)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// Read the `exp` claim (seconds since epoch) out of a JWT payload without
/// verifying the signature. Verification is the server's job; the client only
/// needs to know whether a refresh is due.
fn token_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp")?.as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> TokenStore {
        TokenStore::new(dir.path().join("tokens.json"))
    }

    /// Unsigned JWT with the given exp claim; signature segment is junk,
    /// which the decoder must not care about.
    fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"1","exp":{exp}}}"#));
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn no_token_is_invalid() {
        let dir = TempDir::new().unwrap();
        assert!(!store_in(&dir).has_valid_token());
    }

    #[test]
    fn malformed_token_is_invalid() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.set_tokens("not-a-jwt", "refresh").unwrap();
        assert!(!store.has_valid_token());

        store.set_tokens("a.%%%.c", "refresh").unwrap();
        assert!(!store.has_valid_token());
    }

    #[test]
    fn expired_token_is_invalid() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let past = chrono::Utc::now().timestamp() - 60;
        store.set_tokens(&jwt_with_exp(past), "refresh").unwrap();
        assert!(!store.has_valid_token());
    }

    #[test]
    fn future_expiry_is_valid() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let future = chrono::Utc::now().timestamp() + 3600;
        store.set_tokens(&jwt_with_exp(future), "refresh").unwrap();
        assert!(store.has_valid_token());
    }

    #[test]
    fn tokens_survive_a_new_store_instance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        TokenStore::new(path.clone())
            .set_tokens("access", "refresh")
            .unwrap();

        let reopened = TokenStore::new(path);
        assert_eq!(reopened.access().as_deref(), Some("access"));
        assert_eq!(reopened.refresh().as_deref(), Some("refresh"));
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.set_tokens("a", "r").unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.access().is_none());
        assert!(store.refresh().is_none());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "{{{{").unwrap();
        let store = TokenStore::new(path);
        assert!(store.access().is_none());
        assert!(!store.has_valid_token());
    }
}
