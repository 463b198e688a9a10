use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::api::{
    BackendApi, LoginRequest, OtpVerifyRequest, RefreshTokenRequest, SignupRequest, TokenResponse,
    User,
};
use crate::core::error::{ClientError, Result};
use crate::core::tokens::TokenStore;

/// Owns the current-user state and drives the login / signup / refresh /
/// logout transitions. Constructed once at startup and injected; there is no
/// global session.
pub struct AuthSession {
    api: Arc<dyn BackendApi>,
    tokens: TokenStore,
    user: Mutex<Option<User>>,
    error: Mutex<Option<String>>,
}

impl AuthSession {
    pub fn new(api: Arc<dyn BackendApi>, tokens: TokenStore) -> Self {
        Self {
            api,
            tokens,
            user: Mutex::new(None),
            error: Mutex::new(None),
        }
    }

    pub fn user(&self) -> Option<User> {
        self.user.lock().clone()
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    pub fn clear_error(&self) {
        *self.error.lock() = None;
    }

    /// Authenticated means a user is loaded AND the stored access token has
    /// not expired yet.
    pub fn is_authenticated(&self) -> bool {
        self.user.lock().is_some() && self.tokens.has_valid_token()
    }

    /// Register a new account. Does NOT authenticate: the account stays
    /// unverified until [`verify_otp`](Self::verify_otp) completes, which is
    /// the one signup flow this client implements.
    pub async fn signup(&self, req: SignupRequest) -> Result<String> {
        self.clear_error();
        match self.api.signup(req).await {
            Ok(resp) => Ok(resp.message),
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Exchange the emailed one-time code for a token pair and load the user.
    pub async fn verify_otp(&self, req: OtpVerifyRequest) -> Result<()> {
        self.clear_error();
        match self.api.verify_otp(req).await {
            Ok(resp) => {
                self.apply_tokens(&resp)?;
                self.fetch_current_user().await
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Exchange credentials for a token pair and load the user.
    pub async fn login(&self, req: LoginRequest) -> Result<()> {
        self.clear_error();
        match self.api.login(req).await {
            Ok(resp) => {
                self.apply_tokens(&resp)?;
                self.fetch_current_user().await
            }
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Replace the user snapshot from `/users/me`. A failure here means the
    /// session is unusable, so it logs out before propagating.
    pub async fn fetch_current_user(&self) -> Result<()> {
        match self.api.current_user().await {
            Ok(user) => {
                debug!(user = %user.email, "loaded current user");
                *self.user.lock() = Some(user);
                Ok(())
            }
            Err(e) => {
                self.record_error(&e);
                self.logout();
                Err(e)
            }
        }
    }

    /// Trade the refresh token for a fresh pair. With no refresh token stored
    /// this logs out immediately without touching the network; any failure
    /// also forces logout and propagates.
    pub async fn refresh_session(&self) -> Result<()> {
        let Some(refresh_token) = self.tokens.refresh() else {
            self.logout();
            return Ok(());
        };
        match self
            .api
            .refresh_token(RefreshTokenRequest { refresh_token })
            .await
        {
            Ok(resp) => {
                self.apply_tokens(&resp)?;
                self.fetch_current_user().await
            }
            Err(e) => {
                self.logout();
                Err(e)
            }
        }
    }

    /// Reconcile a cold start with whatever token is on disk. Runs once,
    /// before the first command:
    /// - no stored token: stay anonymous, no network calls;
    /// - valid token: apply it and fetch the user (logging out on failure);
    /// - expired token: delegate to [`refresh_session`](Self::refresh_session).
    pub async fn initialize_auth(&self) -> Result<()> {
        let Some(token) = self.tokens.access() else {
            return Ok(());
        };

        if self.tokens.has_valid_token() {
            self.api.set_auth_token(Some(token));
            if let Err(e) = self.fetch_current_user().await {
                // fetch_current_user already logged out
                warn!("stored session rejected by server: {e}");
            }
            Ok(())
        } else {
            self.refresh_session().await
        }
    }

    /// Clear in-memory user, persisted tokens and the bearer header.
    /// Idempotent.
    pub fn logout(&self) {
        *self.user.lock() = None;
        if let Err(e) = self.tokens.clear() {
            warn!("failed to clear persisted tokens: {e}");
        }
        self.api.set_auth_token(None);
        info!("logged out");
    }

    fn apply_tokens(&self, resp: &TokenResponse) -> Result<()> {
        self.tokens.set_tokens(&resp.access_token, &resp.refresh_token)?;
        self.api.set_auth_token(Some(resp.access_token.clone()));
        Ok(())
    }

    fn record_error(&self, err: &ClientError) {
        *self.error.lock() = Some(err.to_string());
    }
}
