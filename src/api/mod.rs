//! Backend request pipeline.
//!
//! Every call goes through [`ApiClient`]:
//! - the current session's bearer token is attached before send
//! - no response (connect failure, timeout) → [`Error::Network`]
//! - 401 → one guarded clear-and-redirect ([`ExpiryRecovery`]) and
//!   [`Error::SessionExpired`]
//! - 5xx → [`Error::Server`], session untouched
//! - other error statuses → [`Error::Api`] with the backend message
//!
//! Nothing here retries; retry policy belongs to the caller.

pub mod client;
pub mod error;
pub mod recovery;

pub use client::{data_or_self, decode, ApiClient, OnUnauthorized};
pub use error::{Error, Result};
pub use recovery::{ExpiryRecovery, LogNavigator, Navigator};
