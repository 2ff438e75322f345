use zbus::zvariant::{OwnedObjectPath, OwnedValue};

use crate::{
    Result,
    bus::{PropertyMap, clone_map},
    properties::{PropertyValue, decode},
};

/// Decoded `PropertiesChanged` notification for one object.
#[derive(Debug, PartialEq)]
pub struct PropertiesChanged {
    /// Object whose properties changed.
    pub path: OwnedObjectPath,
    /// Interface the properties belong to.
    pub interface: String,
    /// New values by property name.
    pub changed: PropertyMap,
    /// Properties whose value was invalidated rather than sent.
    pub invalidated: Vec<String>,
}

impl PropertiesChanged {
    /// New value of a changed property.
    pub fn value(&self, name: &str) -> Option<&OwnedValue> {
        self.changed.get(name)
    }

    /// New value of a changed property, decoded as `T`.
    ///
    /// Returns `Ok(None)` if the property is not part of the change.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::Decode` if the value is not a `T`.
    pub fn get<T: PropertyValue>(&self, name: &str) -> Result<Option<T>> {
        self.changed
            .get(name)
            .map(|value| decode(name, value.try_clone()?))
            .transpose()
    }

    /// Names of the changed properties, sorted.
    pub fn changed_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.changed.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Whether the property was changed or invalidated.
    pub fn touches(&self, name: &str) -> bool {
        self.changed.contains_key(name) || self.invalidated.iter().any(|n| n == name)
    }

    /// Deep copy of the notification.
    ///
    /// # Errors
    ///
    /// Fails only for values carrying file descriptors.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            path: self.path.clone(),
            interface: self.interface.clone(),
            changed: clone_map(&self.changed)?,
            invalidated: self.invalidated.clone(),
        })
    }
}
