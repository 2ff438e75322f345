use std::{
    collections::HashMap,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, instrument, trace, warn};
use zbus::{
    Connection, MatchRule, Message, MessageStream,
    message::Type as MessageType,
    zvariant::{OwnedObjectPath, OwnedValue, Structure, StructureBuilder, Value},
};

use super::{
    ManagedObjects, OBJECT_MANAGER_INTERFACE, PROPERTIES_INTERFACE, PropertyMap, RegistrationId,
    RemoteTarget, SignalEvent, SignalRule, Transport,
};
use crate::{Result, config::BusKind};

/// Transport backed by a zbus connection.
///
/// Each signal registration owns a match-rule stream drained by one spawned
/// task; releasing the registration aborts the task, which drops the stream
/// and removes the match rule from the bus.
#[derive(Debug)]
pub struct DbusTransport {
    connection: Connection,
    capacity: usize,
    next_id: AtomicU64,
    registrations: Mutex<HashMap<RegistrationId, JoinHandle<()>>>,
}

impl DbusTransport {
    /// Connects to the given bus.
    ///
    /// # Errors
    ///
    /// Returns `BluezError::Transport` if the bus cannot be reached.
    pub async fn connect(bus: BusKind, capacity: usize) -> Result<Self> {
        let connection = match bus {
            BusKind::System => Connection::system().await?,
            BusKind::Session => Connection::session().await?,
        };
        debug!(?bus, "connected to message bus");

        Ok(Self::from_connection(connection, capacity))
    }

    /// Wraps an existing connection.
    pub fn from_connection(connection: Connection, capacity: usize) -> Self {
        Self {
            connection,
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            registrations: Mutex::new(HashMap::new()),
        }
    }

    /// Underlying zbus connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    async fn call_properties<B>(
        &self,
        target: &RemoteTarget,
        member: &str,
        body: &B,
    ) -> Result<Message>
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
    {
        Ok(self
            .connection
            .call_method(
                Some(target.service().as_str()),
                target.path().as_str(),
                Some(PROPERTIES_INTERFACE),
                member,
                body,
            )
            .await?)
    }
}

#[async_trait]
impl Transport for DbusTransport {
    #[instrument(skip(self), fields(object = %target), err)]
    async fn get_all(&self, target: &RemoteTarget) -> Result<PropertyMap> {
        let reply = self
            .call_properties(target, "GetAll", &(target.interface().as_str(),))
            .await?;
        let properties: PropertyMap = reply.body().deserialize()?;

        Ok(properties)
    }

    #[instrument(skip(self), fields(object = %target), err)]
    async fn get(&self, target: &RemoteTarget, name: &str) -> Result<OwnedValue> {
        let reply = self
            .call_properties(target, "Get", &(target.interface().as_str(), name))
            .await?;
        let value: OwnedValue = reply.body().deserialize()?;

        Ok(value)
    }

    #[instrument(skip(self, value), fields(object = %target), err)]
    async fn set(&self, target: &RemoteTarget, name: &str, value: OwnedValue) -> Result<()> {
        let body = (target.interface().as_str(), name, Value::from(value));
        self.call_properties(target, "Set", &body).await?;

        Ok(())
    }

    #[instrument(skip(self, args), fields(object = %target, args = args.len()), err)]
    async fn call(
        &self,
        target: &RemoteTarget,
        method: &str,
        args: Vec<OwnedValue>,
    ) -> Result<Vec<OwnedValue>> {
        let service = Some(target.service().as_str());
        let interface = Some(target.interface().as_str());
        let path = target.path().as_str();

        let reply = if args.is_empty() {
            self.connection
                .call_method(service, path, interface, method, &())
                .await?
        } else {
            let body = args
                .into_iter()
                .fold(StructureBuilder::new(), |builder, arg| {
                    builder.append_field(Value::from(arg))
                })
                .build()?;
            self.connection
                .call_method(service, path, interface, method, &body)
                .await?
        };

        let body = reply.body();
        if body.signature().to_string().is_empty() {
            return Ok(Vec::new());
        }

        let fields: Structure<'_> = body.deserialize()?;
        fields
            .into_fields()
            .into_iter()
            .map(|field| Ok(OwnedValue::try_from(field)?))
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn managed_objects(
        &self,
        service: &str,
        root: &OwnedObjectPath,
    ) -> Result<ManagedObjects> {
        let reply = self
            .connection
            .call_method(
                Some(service),
                root.as_str(),
                Some(OBJECT_MANAGER_INTERFACE),
                "GetManagedObjects",
                &(),
            )
            .await?;
        let objects: ManagedObjects = reply.body().deserialize()?;

        Ok(objects)
    }

    #[instrument(skip(self, sink), fields(path = %rule.path.as_str(), interface = %rule.interface), err)]
    async fn subscribe(
        &self,
        rule: SignalRule,
        sink: mpsc::Sender<SignalEvent>,
    ) -> Result<RegistrationId> {
        let match_rule = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .path(rule.path.clone())?
            .interface(rule.interface.as_str())?
            .build();
        let mut stream =
            MessageStream::for_match_rule(match_rule, &self.connection, Some(self.capacity))
                .await?;

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let task = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Dropping unreadable signal for {id}: {e}");
                        continue;
                    }
                };

                let event = match decode_signal(&message) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Dropping undecodable signal for {id}: {e}");
                        continue;
                    }
                };

                if !rule.matches(&event) {
                    continue;
                }

                trace!(path = %event.path().as_str(), "forwarding signal for {id}");
                if sink.send(event).await.is_err() {
                    debug!("Signal sink for {id} closed");
                    break;
                }
            }
        });

        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, task);
        debug!("registered signal subscription {id}");

        Ok(id)
    }

    fn unsubscribe(&self, id: RegistrationId) -> bool {
        let task = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        match task {
            Some(task) => {
                task.abort();
                debug!("released signal subscription {id}");
                true
            }
            None => false,
        }
    }

    fn registration_count(&self) -> usize {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for DbusTransport {
    fn drop(&mut self) {
        let registrations = self
            .registrations
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, task) in registrations.drain() {
            task.abort();
        }
    }
}

fn decode_signal(message: &Message) -> Result<Option<SignalEvent>> {
    let header = message.header();
    let Some(path) = header.path() else {
        return Ok(None);
    };
    let path = OwnedObjectPath::from(path.clone());
    let member = header.member().map(|m| m.as_str()).unwrap_or_default();
    let body = message.body();

    let event = match member {
        "PropertiesChanged" => {
            let (interface, changed, invalidated): (String, PropertyMap, Vec<String>) =
                body.deserialize()?;
            SignalEvent::PropertiesChanged {
                path,
                interface,
                changed,
                invalidated,
            }
        }
        "InterfacesAdded" => {
            let (object, interfaces): (OwnedObjectPath, HashMap<String, PropertyMap>) =
                body.deserialize()?;
            SignalEvent::InterfacesAdded {
                path: object,
                interfaces,
            }
        }
        "InterfacesRemoved" => {
            let (object, interfaces): (OwnedObjectPath, Vec<String>) = body.deserialize()?;
            SignalEvent::InterfacesRemoved {
                path: object,
                interfaces,
            }
        }
        _ => return Ok(None),
    };

    Ok(Some(event))
}
