//! Bindings for concrete BlueZ interfaces.
//!
//! Each binding is a [`Binding`](crate::binding::Binding) over a generated
//! property set, plus typed getters and the interface's methods.

mod battery;
mod gatt;
mod health;
mod obex;

pub use battery::{Battery1, Battery1Properties};
pub use gatt::{GattService1, GattService1Properties};
pub use health::{HealthDevice1, HealthDevice1Properties};
pub use obex::{Message1, Message1Properties};
