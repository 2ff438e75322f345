use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex as StdMutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

use tokio::sync::Mutex;
use tracing::{debug, instrument, trace, warn};
use zbus::zvariant::OwnedValue;

use super::{PropertySet, PropertyValue, decode};
use crate::{
    BluezError, Result,
    bus::{PropertyMap, RemoteTarget, Transport},
};

/// In-memory mirror of a remote object's property set.
///
/// Cloning the store yields another handle to the same mirror. Every read
/// and write happens under the store's lock, and each property is replaced
/// as a unit. Bulk updates decode into a fresh value before swapping it in,
/// so a failed update leaves the previous contents untouched. Fields written
/// while a bulk load is in flight keep their newer value over the fetched
/// one.
#[derive(Debug)]
pub struct PropertyStore<P: PropertySet> {
    inner: Arc<StoreInner<P>>,
}

#[derive(Debug)]
struct StoreInner<P> {
    properties: RwLock<P>,
    reload: Mutex<()>,
    touched: StdMutex<Option<HashSet<String>>>,
}

impl<P: PropertySet> Clone for PropertyStore<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: PropertySet> Default for PropertyStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PropertySet> PropertyStore<P> {
    /// Creates an empty store holding default values.
    pub fn new() -> Self {
        Self::from_properties(P::default())
    }

    /// Creates a store holding the given values.
    pub fn from_properties(properties: P) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                properties: RwLock::new(properties),
                reload: Mutex::new(()),
                touched: StdMutex::new(None),
            }),
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, P> {
        self.inner
            .properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, P> {
        self.inner
            .properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn touched(&self) -> MutexGuard<'_, Option<HashSet<String>>> {
        self.inner
            .touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a single-field write for an in-flight load. Callers hold the
    /// write guard.
    fn mark_touched(&self, name: &str) {
        if let Some(touched) = self.touched().as_mut() {
            touched.insert(name.to_string());
        }
    }

    /// Copy of the current values.
    pub fn snapshot(&self) -> P {
        self.read_guard().clone()
    }

    /// Runs `f` against the current values under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        f(&self.read_guard())
    }

    /// Replaces every value at once.
    pub fn replace(&self, properties: P) {
        *self.write_guard() = properties;
    }

    /// Wire names of every field, internal ones included.
    pub fn field_names(&self) -> Vec<&'static str> {
        P::FIELDS.iter().map(|spec| spec.name).collect()
    }

    /// Cached value of a property. Never touches the bus.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::PropertyNotFound` if the set has no such field.
    pub fn get(&self, name: &str) -> Result<OwnedValue> {
        self.read_guard().encode_field(name)
    }

    /// Cached value of a property, decoded as `T`.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::PropertyNotFound` for unknown names and
    /// `BluezError::Decode` if `T` is not the field's type.
    pub fn get_typed<T: PropertyValue>(&self, name: &str) -> Result<T> {
        decode(name, self.get(name)?)
    }

    /// Replaces every wire field with a fresh bulk fetch from the remote
    /// object. Internal fields keep their local values, and so do fields
    /// changed through [`apply_changes`](Self::apply_changes),
    /// [`set_local`](Self::set_local) or [`fetch`](Self::fetch) while the
    /// fetch was in flight.
    ///
    /// # Errors
    ///
    /// Returns the transport error, or a decode error if any fetched value
    /// has the wrong type. The store is unchanged in both cases.
    #[instrument(skip(self, transport), fields(object = %target), err)]
    pub async fn load(&self, transport: &dyn Transport, target: &RemoteTarget) -> Result<P> {
        let _reload = self.inner.reload.lock().await;

        *self.touched() = Some(HashSet::new());
        let fetched = transport.get_all(target).await;

        let mut properties = self.write_guard();
        let touched = self.touched().take().unwrap_or_default();

        let mut fresh = P::default();
        Self::decode_into(&mut fresh, fetched?)?;
        for spec in P::FIELDS
            .iter()
            .filter(|spec| spec.is_internal() || touched.contains(spec.name))
        {
            fresh.decode_field(spec.name, properties.encode_field(spec.name)?)?;
        }

        *properties = fresh.clone();
        debug!(
            kept = touched.len(),
            "loaded {} properties",
            P::FIELDS.len()
        );

        Ok(fresh)
    }

    /// Reads one property from the remote object and caches it.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::PropertyNotFound` for unknown or internal names,
    /// the transport error, or a decode error. The cache is unchanged on
    /// failure.
    pub async fn fetch(
        &self,
        transport: &dyn Transport,
        target: &RemoteTarget,
        name: &str,
    ) -> Result<OwnedValue> {
        Self::wire_field(name)?;
        let value = transport.get(target, name).await?;

        let mut properties = self.write_guard();
        properties.decode_field(name, value.try_clone()?)?;
        self.mark_touched(name);

        Ok(value)
    }

    /// Writes one property on the remote object.
    ///
    /// The value is type-checked against the field first. The cache is not
    /// updated; the change notification path reconciles it, or an explicit
    /// [`load`](Self::load).
    ///
    /// # Errors
    ///
    /// Returns `BluezError::PropertyNotFound` for unknown or internal names,
    /// `BluezError::Decode` for a value of the wrong type, or the transport /
    /// remote-rejected error.
    #[instrument(skip(self, transport, value), fields(object = %target), err)]
    pub async fn set_remote(
        &self,
        transport: &dyn Transport,
        target: &RemoteTarget,
        name: &str,
        value: OwnedValue,
    ) -> Result<()> {
        Self::wire_field(name)?;
        let mut scratch = P::default();
        scratch.decode_field(name, value.try_clone()?)?;

        transport.set(target, name, value).await
    }

    /// Writes a value into the cache only.
    ///
    /// Returns whether the field is declared emit-on-change, i.e. whether the
    /// write should be published to watchers.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::PropertyNotFound` or `BluezError::Decode`; the
    /// cache is unchanged on failure.
    pub fn set_local(&self, name: &str, value: OwnedValue) -> Result<bool> {
        let spec = P::field_spec(name)
            .ok_or_else(|| BluezError::PropertyNotFound(name.to_string()))?;
        let mut properties = self.write_guard();
        properties.decode_field(name, value)?;
        self.mark_touched(name);

        Ok(spec.emit)
    }

    /// Applies the `changed` part of a change event.
    ///
    /// Each property is applied on its own; values of the wrong type and
    /// unknown or internal names are skipped. Returns the names applied.
    pub fn apply_changes(&self, changed: &PropertyMap) -> Vec<String> {
        let mut applied = Vec::with_capacity(changed.len());
        let mut properties = self.write_guard();

        for (name, value) in changed {
            if Self::wire_field(name).is_err() {
                trace!(property = %name, "ignoring change of unknown property");
                continue;
            }

            let value = match value.try_clone() {
                Ok(value) => value,
                Err(e) => {
                    warn!(property = %name, "cannot copy changed value: {e}");
                    continue;
                }
            };

            match properties.decode_field(name, value) {
                Ok(()) => {
                    self.mark_touched(name);
                    applied.push(name.clone());
                }
                Err(e) => warn!("Skipping change event value: {e}"),
            }
        }

        applied
    }

    /// Serializes every exported field into an untyped map.
    ///
    /// Internal fields, fields excluded by their flag and empty omit-if-empty
    /// fields are left out.
    ///
    /// # Errors
    ///
    /// Fails only for values that cannot be owned.
    pub fn to_generic_map(&self) -> Result<PropertyMap> {
        let properties = self.read_guard();
        let mut map = PropertyMap::with_capacity(P::FIELDS.len());

        for spec in P::FIELDS {
            if properties.excludes(spec) {
                continue;
            }
            if spec.omit_empty && properties.is_empty_field(spec.name) {
                continue;
            }
            map.insert(spec.name.to_string(), properties.encode_field(spec.name)?);
        }

        Ok(map)
    }

    /// Decodes an untyped map into a new store.
    ///
    /// Missing fields take their default, unknown and internal names are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::Decode` if any value has the wrong runtime type;
    /// no partial store is produced.
    pub fn from_generic_map(map: PropertyMap) -> Result<Self> {
        let mut properties = P::default();
        Self::decode_into(&mut properties, map)?;

        Ok(Self::from_properties(properties))
    }

    fn decode_into(properties: &mut P, map: PropertyMap) -> Result<()> {
        for (name, value) in map {
            if Self::wire_field(&name).is_err() {
                trace!(property = %name, interface = P::INTERFACE, "ignoring unknown property");
                continue;
            }
            properties.decode_field(&name, value)?;
        }
        Ok(())
    }

    fn wire_field(name: &str) -> Result<()> {
        match P::field_spec(name) {
            Some(spec) if !spec.is_internal() => Ok(()),
            _ => Err(BluezError::PropertyNotFound(name.to_string())),
        }
    }
}
