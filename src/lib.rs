#![forbid(unsafe_code)]

//! Front-desk client core for hotel staff apps.
//!
//! - [`session`]: login, logout and the persisted session
//! - [`api`]: authenticated backend calls with session-expiry recovery
//! - [`push`]: device push-token acquisition and backend registration
//! - [`notifications`]: notification subscriptions and the staff inbox
//! - [`services`]: bookings and utility meter readings
//!
//! [`FrontDesk`] wires these together behind `init` / `dispose`.

pub mod api;
pub mod app;
pub mod config;
pub mod notifications;
pub mod push;
pub mod services;
pub mod session;
pub mod storage;

pub use api::{ApiClient, Error, Navigator};
pub use app::FrontDesk;
pub use config::Config;
pub use session::{Session, SessionState, SessionStore};
