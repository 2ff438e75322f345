use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use crate::{BluezError, Result, properties::PropertyValue};

/// Parses `text` into a value of the same D-Bus type as `current`.
///
/// Booleans accept `true`/`false`, `yes`/`no`, `on`/`off` and `1`/`0`.
/// Only scalar types are supported.
///
/// # Errors
///
/// Returns `BluezError::InvalidValue` if the text does not parse or the
/// type is not supported.
pub fn parse_value_like(current: &Value<'_>, text: &str) -> Result<OwnedValue> {
    let invalid = |kind: &str| BluezError::InvalidValue(format!("'{text}' is not a valid {kind}"));

    let value = match current {
        Value::Value(inner) => return parse_value_like(inner, text),
        Value::Bool(_) => match text.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => true.to_value()?,
            "false" | "no" | "off" | "0" => false.to_value()?,
            _ => return Err(invalid("boolean")),
        },
        Value::U8(_) => text.parse::<u8>().map_err(|_| invalid("byte"))?.to_value()?,
        Value::I16(_) => text.parse::<i16>().map_err(|_| invalid("int16"))?.to_value()?,
        Value::U16(_) => text.parse::<u16>().map_err(|_| invalid("uint16"))?.to_value()?,
        Value::I32(_) => text.parse::<i32>().map_err(|_| invalid("int32"))?.to_value()?,
        Value::U32(_) => text.parse::<u32>().map_err(|_| invalid("uint32"))?.to_value()?,
        Value::I64(_) => text.parse::<i64>().map_err(|_| invalid("int64"))?.to_value()?,
        Value::U64(_) => text.parse::<u64>().map_err(|_| invalid("uint64"))?.to_value()?,
        Value::Str(_) => text.to_string().to_value()?,
        Value::ObjectPath(_) => OwnedObjectPath::try_from(text)
            .map_err(|_| invalid("object path"))?
            .to_value()?,
        other => {
            return Err(BluezError::InvalidValue(format!(
                "cannot set values of signature '{}' from the command line",
                other.value_signature()
            )));
        }
    };

    Ok(value)
}
