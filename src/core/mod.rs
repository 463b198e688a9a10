pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod store;
pub mod tokens;
pub mod transcripts;
