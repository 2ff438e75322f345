use zbus::zvariant::{self, OwnedObjectPath, OwnedValue, Value};

use crate::{BluezError, Result};

/// A Rust type that can hold the value of a D-Bus property.
///
/// Conversions are strict: a `u8` field only accepts a value whose runtime
/// signature is `y`. Nested variants are unwrapped before converting.
pub trait PropertyValue: Sized + Clone + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Human readable name of the type, used in decode errors.
    const KIND: &'static str;

    /// Encodes the value for the wire.
    ///
    /// # Errors
    ///
    /// Fails only for values that cannot be owned (file descriptors).
    fn to_value(&self) -> zvariant::Result<OwnedValue>;

    /// Decodes a wire value.
    ///
    /// # Errors
    ///
    /// Fails if the runtime type of `value` differs from `Self`.
    fn from_value(value: OwnedValue) -> zvariant::Result<Self>;

    /// Whether the value counts as empty for omit-if-empty fields.
    fn is_empty_value(&self) -> bool {
        false
    }
}

fn unwrap_variant(value: Value<'_>) -> Value<'_> {
    match value {
        Value::Value(inner) => unwrap_variant(*inner),
        other => other,
    }
}

macro_rules! scalar_property_value {
    ($($ty:ty => $kind:literal),* $(,)?) => {
        $(
            impl PropertyValue for $ty {
                const KIND: &'static str = $kind;

                fn to_value(&self) -> zvariant::Result<OwnedValue> {
                    OwnedValue::try_from(Value::from(self.clone()))
                }

                fn from_value(value: OwnedValue) -> zvariant::Result<Self> {
                    Self::try_from(unwrap_variant(Value::from(value)))
                }
            }
        )*
    };
}

macro_rules! sized_property_value {
    ($($ty:ty => $kind:literal),* $(,)?) => {
        $(
            impl PropertyValue for $ty {
                const KIND: &'static str = $kind;

                fn to_value(&self) -> zvariant::Result<OwnedValue> {
                    OwnedValue::try_from(Value::from(self.clone()))
                }

                fn from_value(value: OwnedValue) -> zvariant::Result<Self> {
                    Self::try_from(unwrap_variant(Value::from(value)))
                }

                fn is_empty_value(&self) -> bool {
                    self.is_empty()
                }
            }
        )*
    };
}

scalar_property_value! {
    bool => "boolean",
    u8 => "byte",
    i16 => "int16",
    u16 => "uint16",
    i32 => "int32",
    u32 => "uint32",
    i64 => "int64",
    u64 => "uint64",
    OwnedObjectPath => "object path",
}

sized_property_value! {
    String => "string",
    Vec<u8> => "byte array",
    Vec<String> => "string array",
    Vec<OwnedObjectPath> => "object path array",
}

/// Decodes a wire value into the declared type of `property`.
///
/// # Errors
///
/// Returns `BluezError::Decode` naming the property, the declared type and
/// the signature actually received.
pub fn decode<T: PropertyValue>(property: &str, value: OwnedValue) -> Result<T> {
    let found = value.value_signature().to_string();
    T::from_value(value).map_err(|_| BluezError::Decode {
        property: property.to_string(),
        expected: T::KIND,
        found,
    })
}
