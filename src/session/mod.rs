//! Authenticated session lifecycle.
//!
//! ## Design
//! - [`SessionCell`] holds the in-memory state and the persisted
//!   `user_data` record; the API client and push coordinator read it
//! - [`SessionStore`] drives login, logout and restore
//! - State transitions are published on a `watch` channel and pushed to
//!   [`SessionObserver`]s

pub mod state;
pub mod store;

pub use state::{ClearReason, Session, SessionCell, SessionObserver, SessionState, UserProfile};
pub use store::SessionStore;

pub(crate) use state::token_preview;
