//! Device push registration.
//!
//! The OS push token is acquired through a [`PushPlatform`] and reported to
//! the backend at `/user/device-token` once per authenticated session.
//!
//! ## Design
//! - Token acquisition never fails; denial or missing hardware disables
//!   push for the current run
//! - Registration is keyed by token value, so a rotated OS token is
//!   registered again
//! - Session observers reset the registration on logout and expiry; the
//!   token itself survives until an explicit data reset

pub mod coordinator;
pub mod platform;

pub use coordinator::PushCoordinator;
pub use platform::{
    DeviceToken, PermissionStatus, Platform, PresentationOptions, PushPlatform, StaticPushPlatform,
};
