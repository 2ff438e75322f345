//! bluez-props - typed property mirrors and change notifications for BlueZ.
//!
//! Every BlueZ interface binding is the same composition: a
//! [`PropertyStore`](properties::PropertyStore) mirroring the remote
//! object's properties, a [`ChangeBridge`](signals::ChangeBridge) turning
//! `PropertiesChanged` signals into typed notifications, and an optional
//! registration on a shared [`ObjectManagerHub`](object_manager::ObjectManagerHub).
//! The main features include:
//!
//! - Property sets generated from a per-field metadata table
//! - Atomic bulk loads that never leave a store half-updated
//! - Cancellable change channels with a single typed watcher per object
//! - A transport seam with a zbus backend and an in-process fake daemon
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bluez_props::{bus::DbusTransport, config::BusKind, profiles::Battery1};
//!
//! # async fn run() -> bluez_props::Result<()> {
//! let transport = Arc::new(DbusTransport::connect(BusKind::System, 64).await?);
//! let battery = Battery1::new(transport, "/org/bluez/hci0/dev_00_11_22_33_44_55").await?;
//! println!("battery at {}%", battery.properties().percentage);
//!
//! let watch = battery.watch_properties().await?;
//! while let Some(change) = watch.recv().await {
//!     println!("now at {:?}%", change.get::<u8>("Percentage")?);
//! }
//! # Ok(())
//! # }
//! ```

/// Configuration schema, loading and validation.
pub mod config;

/// Core error types and result aliases.
pub mod core;

/// Message bus transport seam.
pub mod bus;

/// Typed property sets and their store.
pub mod properties;

/// Change-notification channels and bridge.
pub mod signals;

/// Shared object-manager feed.
pub mod object_manager;

/// Remote object handles and the generic binding.
pub mod binding;

/// Concrete BlueZ interface bindings.
pub mod profiles;

/// Command-line interface.
pub mod cli;

/// Tracing subscriber setup.
pub mod tracing_config;

/// Re-exported core types for convenience.
pub use crate::core::{BluezError, RejectionKind, Result};

pub use zbus;
