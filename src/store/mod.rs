//! Session state store and its change notifications.

pub mod events;
pub mod session_store;

pub use events::{Change, StoreEvent};
pub use session_store::{SessionStore, SharedStore, StoreStats};
