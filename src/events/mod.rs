//! Engine event subscriptions.

mod bus;
mod stream;
mod types;

pub use bus::EventBus;
pub use stream::Subscription;
pub use types::{Advisory, EngineEvent, EventFilter, EventKind, ReminderChange, SubscriptionId};
