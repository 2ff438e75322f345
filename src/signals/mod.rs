//! Change notifications for remote objects.
//!
//! [`ChangeBridge`] turns the raw `PropertiesChanged` signals of one object
//! into typed [`PropertiesChanged`] notifications delivered on an
//! [`EventChannel`]. Every channel carries its own cancellation token;
//! cancelling it stops whatever task feeds or drains it.

mod bridge;
mod changes;
mod channel;

pub use bridge::{ChangeBridge, PropertyWatch};
pub use changes::PropertiesChanged;
pub use channel::{EventChannel, EventSink};
