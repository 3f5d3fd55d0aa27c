use crate::config::Config;
use crate::error::{IngestError, MQTTError};
use crate::ingest::{IngestReport, Ingestor};
use crate::mqtt::{Transport, TransportEvent};
use crate::registry::TopicRegistry;
use crate::resolver::{FallbackSensor, Resolver};
use crate::store::{DeviceRegistry, ReadingStore, SensorRegistry};
use ambiental_core::TelemetryMessage;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

pub mod device;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Connecting,
    Subscribing,
    Running,
    Reconnecting,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Subscribing => "subscribing",
            LifecycleState::Running => "running",
            LifecycleState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ObserverSettings {
    pub default_topic: String,
    pub fallback: FallbackSensor,
}

impl ObserverSettings {
    pub fn from_config(config: &Config) -> Self {
        ObserverSettings {
            default_topic: config.mqtt_topic().to_owned(),
            fallback: FallbackSensor::from_config(config),
        }
    }
}

/// Drives the broker session: subscribes on connect, routes every publish through
/// resolve and ingest, forgets subscriptions when the connection is lost.
pub struct Coordinator {
    transport: Arc<dyn Transport>,
    devices: Arc<dyn DeviceRegistry>,
    registry: TopicRegistry,
    resolver: Resolver,
    ingestor: Ingestor,
    default_topic: String,
    state: RwLock<LifecycleState>,
    shutdown: CancellationToken,
}

impl Coordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        devices: Arc<dyn DeviceRegistry>,
        sensors: Arc<dyn SensorRegistry>,
        readings: Arc<dyn ReadingStore>,
        settings: ObserverSettings,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Coordinator {
            registry: TopicRegistry::new(transport.clone()),
            resolver: Resolver::new(devices.clone(), sensors, settings.fallback),
            ingestor: Ingestor::new(readings),
            transport,
            devices,
            default_topic: settings.default_topic,
            state: RwLock::new(LifecycleState::Stopped),
            shutdown,
        })
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub async fn subscribed_topics(&self) -> Vec<String> {
        self.registry.topics().await
    }

    /// Leaves `Stopped`, the transport connects once its event loop is dispatched.
    pub fn start(&self) {
        let mut state = self.state.write();
        if *state == LifecycleState::Stopped {
            *state = LifecycleState::Connecting;
            info!("Connecting, default topic {}", self.default_topic);
        } else {
            warn!("start() called in state {}", *state);
        }
    }

    /// Consumes transport events strictly in order until shutdown.
    /// A message being handled when shutdown is requested is finished first.
    /// Blocks caller task in infinite loop
    pub async fn dispatch_event_loop(
        self: Arc<Self>,
        mut receiver: UnboundedReceiver<TransportEvent>,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                event = receiver.recv() => match event {
                    Some(event) => event,
                    None => {
                        debug!("Transport event channel closed");
                        break;
                    }
                },
            };
            self.handle_event(event).await;
        }
        self.set_state(LifecycleState::Stopped);
        info!("Ended coordinator event loop");
    }

    pub async fn handle_event(&self, event: TransportEvent) {
        if self.state() == LifecycleState::Stopped {
            debug!("Ignored {:?} while stopped", event);
            return;
        }

        match event {
            TransportEvent::Connected => self.on_connected().await,
            TransportEvent::Disconnected | TransportEvent::Reconnecting => {
                self.on_connection_lost().await
            }
            TransportEvent::Message { topic, payload } => {
                let span = info_span!("message", topic = %topic);
                match self.on_message(&topic, &payload).instrument(span).await {
                    Ok(report) => debug!(
                        topic = %topic,
                        "Stored {} readings, {} failed",
                        report.created.len(),
                        report.failed.len()
                    ),
                    Err(IngestError::Payload(e)) => {
                        warn!(topic = %topic, "Dropped malformed payload: {}", e)
                    }
                    Err(e) => error!(topic = %topic, "Dropped message: {}", e),
                }
            }
            TransportEvent::Error(msg) => warn!("Transport error: {}", msg),
        }
    }

    async fn on_connected(&self) {
        self.set_state(LifecycleState::Subscribing);

        let default_subscribed = match self.registry.subscribe_topic(&self.default_topic).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed subscribing default topic {}: {}", self.default_topic, e);
                false
            }
        };

        match self
            .registry
            .bulk_subscribe_active_devices(self.devices.as_ref())
            .await
        {
            Ok(report) => {
                for (topic, e) in report.failed.iter() {
                    warn!(topic = %topic, "Device topic not subscribed: {}", e);
                }
            }
            Err(e) => error!("Failed loading active devices: {}", e),
        }

        if default_subscribed {
            // shutdown may have happened during the round-trips
            let mut state = self.state.write();
            if *state == LifecycleState::Subscribing {
                *state = LifecycleState::Running;
                info!("Running");
            }
        }
    }

    async fn on_connection_lost(&self) {
        let dropped = self.registry.reset().await;
        let mut state = self.state.write();
        if *state != LifecycleState::Stopped && *state != LifecycleState::Reconnecting {
            info!("Connection lost, forgot {} subscriptions", dropped);
            *state = LifecycleState::Reconnecting;
        }
    }

    /// Decodes a publish and stores its readings for the resolved sensor.
    /// Nothing is resolved for a payload that isn't a JSON object.
    pub async fn on_message(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<IngestReport, IngestError> {
        let message = TelemetryMessage::from_slice(payload)?;
        let resolution = self.resolver.resolve(topic).await?;
        debug!(
            sensor_id = resolution.sensor.id,
            fallback = resolution.is_fallback,
            "Resolved {} fields",
            message.len()
        );
        Ok(self.ingestor.ingest(&resolution.sensor, &message).await)
    }

    /// Subscribes a newly registered topic, returns `false` when there is no connection.
    pub async fn add_topic(&self, topic: &str) -> Result<bool, MQTTError> {
        if !self.transport.is_connected() {
            debug!(topic = %topic, "Not connected, topic subscribed on next connect");
            return Ok(false);
        }
        self.registry.subscribe_topic(topic).await?;
        Ok(true)
    }

    /// Unsubscribes a removed topic, the default topic stays subscribed.
    pub async fn remove_topic(&self, topic: &str) -> Result<bool, MQTTError> {
        if topic == self.default_topic {
            debug!(topic = %topic, "Kept default topic");
            return Ok(false);
        }
        if !self.transport.is_connected() {
            debug!(topic = %topic, "Not connected, skipped unsubscribe");
            return Ok(false);
        }
        self.registry.unsubscribe_topic(topic).await?;
        Ok(true)
    }

    /// Moves to `Stopped` and stops the transport, later events are ignored.
    pub fn shutdown(&self) {
        self.set_state(LifecycleState::Stopped);
        self.shutdown.cancel();
        info!("Shutdown requested");
    }

    fn set_state(&self, next: LifecycleState) {
        let mut state = self.state.write();
        if *state != next {
            debug!("State {} -> {}", *state, next);
            *state = next;
        }
    }
}
