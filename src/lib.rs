//! Client library for a remote meeting-transcription service.
//!
//! The pieces layer leaf to root: [`core::tokens::TokenStore`] persists the
//! token pair, [`core::http::HttpClient`] talks to the REST backend,
//! [`core::auth::AuthSession`] drives the login/refresh lifecycle, and
//! [`core::store::TranscriptStore`] uploads audio or ends a meeting bot and
//! polls transcript status to a terminal state.

pub mod app;
pub mod core;

pub use app::App;
pub use crate::core::auth::AuthSession;
pub use crate::core::config::Config;
pub use crate::core::error::ClientError;
pub use crate::core::store::TranscriptStore;
pub use crate::core::tokens::TokenStore;
