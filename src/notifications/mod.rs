//! Received notifications.
//!
//! [`NotificationHub`] is the subscription point platform code dispatches
//! into; [`NotificationInbox`] is the persisted list shown to staff.

pub mod hub;
pub mod inbox;

pub use hub::{IncomingNotification, NotificationHandler, NotificationHub, Subscription};
pub use inbox::{NotificationInbox, NotificationItem};
