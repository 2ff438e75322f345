use std::sync::Arc;

use tracing::{debug, instrument};

use super::{
    formatting::{format_header, format_invalidated, format_object_event, format_property},
    parse_value_like,
};
use crate::{
    Result,
    bus::{DbusTransport, RemoteTarget, SignalEvent, Transport},
    config::{BluezConfig, BusKind},
    object_manager::ObjectManagerHub,
    signals::ChangeBridge,
};

const OBEX_INTERFACE_PREFIX: &str = "org.bluez.obex.";

/// Daemon name and bus serving `interface`.
pub(super) fn endpoint(config: &BluezConfig, session: bool, interface: &str) -> (String, BusKind) {
    let (service, bus) = if interface.starts_with(OBEX_INTERFACE_PREFIX) {
        (config.obex_service.clone(), config.obex_bus)
    } else {
        (config.service.clone(), config.bus)
    };

    if session {
        (service, BusKind::Session)
    } else {
        (service, bus)
    }
}

async fn connect(config: &BluezConfig, bus: BusKind) -> Result<Arc<dyn Transport>> {
    let transport = DbusTransport::connect(bus, config.channel_capacity).await?;
    Ok(Arc::new(transport))
}

async fn open_target(
    config: &BluezConfig,
    session: bool,
    path: &str,
    interface: &str,
) -> Result<(Arc<dyn Transport>, RemoteTarget)> {
    let (service, bus) = endpoint(config, session, interface);
    let target = RemoteTarget::new(&service, interface, path)?;
    let transport = connect(config, bus).await?;

    Ok((transport, target))
}

#[instrument(skip(config))]
pub(super) async fn get(
    config: &BluezConfig,
    session: bool,
    path: &str,
    interface: &str,
    name: Option<&str>,
) -> Result<()> {
    let (transport, target) = open_target(config, session, path, interface).await?;

    if let Some(name) = name {
        let value = transport.get(&target, name).await?;
        println!("{}", format_property(name, &value));
        return Ok(());
    }

    let properties = transport.get_all(&target).await?;
    let mut names: Vec<_> = properties.keys().collect();
    names.sort_unstable();

    println!("{}", format_header(&target.to_string()));
    for name in names {
        if let Some(value) = properties.get(name) {
            println!("{}", format_property(name, value));
        }
    }

    Ok(())
}

#[instrument(skip(config))]
pub(super) async fn set(
    config: &BluezConfig,
    session: bool,
    path: &str,
    interface: &str,
    name: &str,
    text: &str,
) -> Result<()> {
    let (transport, target) = open_target(config, session, path, interface).await?;

    let current = transport.get(&target, name).await?;
    let value = parse_value_like(&current, text)?;
    debug!(property = name, "writing {}", value.value_signature());

    transport.set(&target, name, value).await?;
    let updated = transport.get(&target, name).await?;
    println!("{}", format_property(name, &updated));

    Ok(())
}

#[instrument(skip(config))]
pub(super) async fn watch(
    config: &BluezConfig,
    session: bool,
    path: &str,
    interface: &str,
) -> Result<()> {
    let (transport, target) = open_target(config, session, path, interface).await?;
    let bridge = ChangeBridge::new(transport, target, config.channel_capacity);
    let channel = bridge.subscribe().await?;

    println!("{}", format_header(&format!("Watching {}", bridge.target())));
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = channel.recv() => event,
        };

        match event {
            Some(SignalEvent::PropertiesChanged {
                interface: changed_interface,
                changed,
                invalidated,
                ..
            }) if changed_interface == interface => {
                let mut names: Vec<_> = changed.keys().collect();
                names.sort_unstable();
                for name in names {
                    if let Some(value) = changed.get(name) {
                        println!("{}", format_property(name, value));
                    }
                }
                for name in &invalidated {
                    println!("{}", format_invalidated(name));
                }
            }
            Some(_) => continue,
            None => break,
        }
    }

    bridge.unsubscribe().await;
    Ok(())
}

#[instrument(skip(config))]
pub(super) async fn objects(config: &BluezConfig, session: bool, follow: bool) -> Result<()> {
    let bus = if session { BusKind::Session } else { config.bus };
    let transport = connect(config, bus).await?;
    let hub = ObjectManagerHub::new(transport, config);

    let registration = if follow {
        Some(hub.register().await?)
    } else {
        None
    };

    let objects = hub.managed_objects().await?;
    let mut paths: Vec<_> = objects.keys().collect();
    paths.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));

    for path in paths {
        println!("{}", format_header(path.as_str()));
        let Some(interfaces) = objects.get(path) else {
            continue;
        };
        let mut names: Vec<_> = interfaces.keys().collect();
        names.sort_unstable();
        for name in names {
            println!("  {name}");
        }
    }

    let Some(registration) = registration else {
        return Ok(());
    };

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = registration.recv() => event,
        };
        match event {
            Some(event) => println!("{}", format_object_event(&event)),
            None => break,
        }
    }

    hub.unregister(&registration);
    Ok(())
}
