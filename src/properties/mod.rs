//! Typed mirrors of remote property sets.
//!
//! A [`PropertySet`] is a plain struct with one field per D-Bus property and a
//! static [`FieldSpec`] table describing how each field takes part in the
//! generic (untyped) form. Sets are generated with [`bluez_properties!`] and
//! held behind a [`PropertyStore`].
//!
//! [`bluez_properties!`]: crate::bluez_properties

mod field;
#[macro_use]
mod macros;
mod store;
mod value;

use std::fmt::Debug;

pub use field::{FieldSpec, Ignore};
pub use store::PropertyStore;
pub use value::{PropertyValue, decode};
use zbus::zvariant::OwnedValue;

use crate::Result;

/// A typed property set for one D-Bus interface.
pub trait PropertySet: Default + Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Interface the properties belong to.
    const INTERFACE: &'static str;

    /// Metadata for every field, in declaration order.
    const FIELDS: &'static [FieldSpec];

    /// Encodes the field with the given wire name.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::PropertyNotFound` for unknown names.
    fn encode_field(&self, name: &str) -> Result<OwnedValue>;

    /// Decodes `value` into the field with the given wire name.
    ///
    /// The field is replaced only if decoding succeeds.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::PropertyNotFound` for unknown names and
    /// `BluezError::Decode` if the value has the wrong type.
    fn decode_field(&mut self, name: &str, value: OwnedValue) -> Result<()>;

    /// Whether the field holds an empty string or list.
    fn is_empty_field(&self, name: &str) -> bool;

    /// Metadata of a field.
    fn field_spec(name: &str) -> Option<&'static FieldSpec> {
        Self::FIELDS.iter().find(|spec| spec.name == name)
    }

    /// Reads a boolean field, `false` if absent or not boolean.
    fn flag(&self, name: &str) -> bool {
        self.encode_field(name)
            .ok()
            .and_then(|value| bool::from_value(value).ok())
            .unwrap_or(false)
    }

    /// Whether `spec` is left out of this set's generic map.
    fn excludes(&self, spec: &FieldSpec) -> bool {
        match spec.ignore {
            Ignore::Never => false,
            Ignore::Always => true,
            Ignore::When(flag) => self.flag(flag),
        }
    }
}
