use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::MQTTError;
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubAck,
    SubscribeReasonCode, UnsubAck,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

#[cfg(test)]
pub mod mock;

const QOS: QoS = QoS::AtLeastOnce;
const DEFAULT_PORT: u16 = 1883;
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Reconnecting,
    Disconnected,
    Message { topic: String, payload: Vec<u8> },
    Error(String),
}

/// Subscription primitives of a broker connection.
///
/// `subscribe` and `unsubscribe` resolve only after the broker acknowledged the request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), MQTTError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), MQTTError>;

    fn is_connected(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker: String,
    pub client_id: String,
    pub keep_alive: Duration,
    pub reconnect_interval: Duration,
    pub timeout: Duration,
}

impl MqttSettings {
    pub fn from_config(config: &Config) -> Self {
        MqttSettings {
            broker: config.mqtt_broker().to_owned(),
            client_id: config.mqtt_client_id(),
            keep_alive: config.mqtt_keep_alive(),
            reconnect_interval: config.mqtt_reconnect_interval(),
            timeout: config.mqtt_timeout(),
        }
    }
}

/// Splits `mqtt://host[:port]` into host and port, the scheme defaults to `mqtt`.
pub fn parse_broker(address: &str) -> Result<(String, u16), MQTTError> {
    let address = address.trim();
    let normalized = if address.contains("://") {
        address.to_owned()
    } else {
        format!("mqtt://{}", address)
    };

    let url = Url::parse(&normalized)
        .map_err(|e| MQTTError::InvalidBroker(format!("{}: {}", address, e)))?;
    match url.scheme() {
        "mqtt" | "tcp" => (),
        other => {
            return Err(MQTTError::InvalidBroker(format!(
                "{}: unsupported scheme {}",
                address, other
            )))
        }
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MQTTError::InvalidBroker(format!("{}: missing host", address)))?;
    Ok((host.to_owned(), url.port().unwrap_or(DEFAULT_PORT)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AckKind {
    Subscribe,
    Unsubscribe,
}

struct PendingAck {
    topic: String,
    reply: oneshot::Sender<Result<(), MQTTError>>,
}

/// Correlates requests with SUBACK/UNSUBACK packets.
///
/// Requests are queued in the order they are handed to the client, the event loop announces
/// the packet id of each outgoing request in that same order. Packets of a lost connection are
/// counted as stale, a resumed session replays them before any new request goes out.
#[derive(Default)]
struct AckTracker {
    queued: HashMap<AckKind, VecDeque<PendingAck>>,
    in_flight: HashMap<(AckKind, u16), PendingAck>,
    stale: HashMap<AckKind, usize>,
}

impl AckTracker {
    fn queue(&mut self, kind: AckKind, topic: &str, reply: oneshot::Sender<Result<(), MQTTError>>) {
        self.queued.entry(kind).or_default().push_back(PendingAck {
            topic: topic.to_owned(),
            reply,
        });
    }

    fn unqueue_last(&mut self, kind: AckKind) {
        if let Some(queue) = self.queued.get_mut(&kind) {
            queue.pop_back();
        }
    }

    fn on_outgoing(&mut self, kind: AckKind, pkid: u16) {
        if let Some(stale) = self.stale.get_mut(&kind).filter(|n| **n > 0) {
            *stale -= 1;
            debug!(pkid = pkid, "Replayed {:?} of previous connection", kind);
            return;
        }
        match self.queued.get_mut(&kind).and_then(|q| q.pop_front()) {
            Some(pending) => {
                self.in_flight.insert((kind, pkid), pending);
            }
            None => debug!(pkid = pkid, "Untracked outgoing {:?}", kind),
        }
    }

    fn on_suback(&mut self, ack: &SubAck) {
        if let Some(pending) = self.in_flight.remove(&(AckKind::Subscribe, ack.pkid)) {
            let rejected = ack
                .return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure));
            let result = if rejected {
                Err(MQTTError::SubscribeRejected(pending.topic))
            } else {
                Ok(())
            };
            let _ = pending.reply.send(result);
        }
    }

    fn on_unsuback(&mut self, ack: &UnsubAck) {
        if let Some(pending) = self.in_flight.remove(&(AckKind::Unsubscribe, ack.pkid)) {
            let _ = pending.reply.send(Ok(()));
        }
    }

    /// Fails every pending request, their packets stay with the client's session.
    fn fail_all(&mut self) {
        let queued = self
            .queued
            .drain()
            .flat_map(|(kind, q)| q.into_iter().map(move |p| (kind, p)));
        let in_flight = self.in_flight.drain().map(|((kind, _), p)| (kind, p));
        for (kind, pending) in queued.chain(in_flight) {
            *self.stale.entry(kind).or_default() += 1;
            let _ = pending.reply.send(Err(MQTTError::Disconnected));
        }
    }

    /// A fresh broker session discards the packets of the previous one.
    fn on_session(&mut self, session_present: bool) {
        if !session_present {
            self.stale.clear();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.queued.values().map(VecDeque::len).sum::<usize>() + self.in_flight.len()
    }
}

pub struct MqttClient {
    client: AsyncClient,
    eventloop: tokio::sync::Mutex<EventLoop>,
    acks: Mutex<AckTracker>,
    is_connected: AtomicBool,
    shutdown: CancellationToken,
    settings: MqttSettings,
    host: String,
    port: u16,
}

impl std::fmt::Debug for MqttClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttClient")
            .field("broker", &self.settings.broker)
            .field("client_id", &self.settings.client_id)
            .finish()
    }
}

impl MqttClient {
    pub fn new(settings: MqttSettings, shutdown: CancellationToken) -> Result<Self, MQTTError> {
        let (host, port) = parse_broker(&settings.broker)?;
        let mut options = MqttOptions::new(settings.client_id.clone(), host.clone(), port);
        options
            .set_keep_alive(settings.keep_alive.max(MIN_KEEP_ALIVE))
            .set_clean_session(true);
        let (client, eventloop) = AsyncClient::new(options, 64);

        Ok(MqttClient {
            client,
            eventloop: tokio::sync::Mutex::new(eventloop),
            acks: Mutex::new(AckTracker::default()),
            is_connected: AtomicBool::new(false),
            shutdown,
            settings,
            host,
            port,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.settings.client_id
    }

    /// Polls the connection until shutdown, forwarding lifecycle events and publishes.
    /// Connection errors are retried forever after the fixed reconnect interval.
    /// Blocks caller task in infinite loop
    pub async fn dispatch_event_loop(self: Arc<Self>, sender: UnboundedSender<TransportEvent>) {
        let mut eventloop = match self.eventloop.try_lock() {
            Ok(eventloop) => eventloop,
            Err(_) => {
                error!("dispatch_event_loop() already called!");
                return;
            }
        };

        info!(
            client_id = %self.settings.client_id,
            "Connecting to MQTT broker {}:{}", self.host, self.port
        );
        loop {
            let polled = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                polled = eventloop.poll() => polled,
            };

            match polled {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        self.acks.lock().on_session(ack.session_present);
                        self.is_connected.store(true, Ordering::SeqCst);
                        info!("Connected to MQTT broker {}:{}", self.host, self.port);
                        Self::emit(&sender, TransportEvent::Connected);
                    } else {
                        warn!("Broker refused connection: {:?}", ack.code);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    trace!(topic = %publish.topic, "Received {} bytes", publish.payload.len());
                    Self::emit(
                        &sender,
                        TransportEvent::Message {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        },
                    );
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => self.acks.lock().on_suback(&ack),
                Ok(Event::Incoming(Packet::UnsubAck(ack))) => self.acks.lock().on_unsuback(&ack),
                Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                    self.acks.lock().on_outgoing(AckKind::Subscribe, pkid)
                }
                Ok(Event::Outgoing(Outgoing::Unsubscribe(pkid))) => {
                    self.acks.lock().on_outgoing(AckKind::Unsubscribe, pkid)
                }
                Ok(other) => trace!("MQTT event: {:?}", other),
                Err(e) => {
                    let was_connected = {
                        let mut acks = self.acks.lock();
                        acks.fail_all();
                        self.is_connected.swap(false, Ordering::SeqCst)
                    };
                    if was_connected {
                        warn!("Disconnected from MQTT broker: {}", e);
                        Self::emit(&sender, TransportEvent::Disconnected);
                    } else {
                        error!("Couldn't connect to broker {}:{}: {}", self.host, self.port, e);
                        Self::emit(&sender, TransportEvent::Error(e.to_string()));
                    }

                    info!(
                        "Reconnecting to MQTT broker in {} ms",
                        self.settings.reconnect_interval.as_millis()
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.settings.reconnect_interval) => (),
                    }
                    Self::emit(&sender, TransportEvent::Reconnecting);
                }
            }
        }

        self.close(&mut eventloop).await;
        info!("Ended MQTT event loop");
    }

    /// Stops the event loop, no events are emitted afterwards.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn close(&self, eventloop: &mut EventLoop) {
        let was_connected = {
            let mut acks = self.acks.lock();
            acks.fail_all();
            self.is_connected.swap(false, Ordering::SeqCst)
        };
        if !was_connected || self.client.try_disconnect().is_err() {
            return;
        }

        // flush the DISCONNECT packet
        let flushed = tokio::time::timeout(self.settings.timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => (),
                }
            }
        })
        .await;
        if flushed.is_err() {
            warn!("Timeout sending MQTT disconnect");
        } else {
            info!("MQTT connection closed");
        }
    }

    async fn request(&self, kind: AckKind, topic: &str) -> Result<(), MQTTError> {
        let (reply, acked) = oneshot::channel();
        {
            // queue and hand over atomically with respect to a connection loss
            let mut acks = self.acks.lock();
            if !self.is_connected() {
                return Err(MQTTError::NotConnected);
            }
            acks.queue(kind, topic, reply);
            let sent = match kind {
                AckKind::Subscribe => self.client.try_subscribe(topic, QOS),
                AckKind::Unsubscribe => self.client.try_unsubscribe(topic),
            };
            if let Err(e) = sent {
                acks.unqueue_last(kind);
                return Err(e.into());
            }
        }

        let ack_name = match kind {
            AckKind::Subscribe => "SUBACK",
            AckKind::Unsubscribe => "UNSUBACK",
        };
        match tokio::time::timeout(self.settings.timeout, acked).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(MQTTError::Disconnected),
            Err(_) => Err(MQTTError::Timeout(format!("{} on {}", ack_name, topic))),
        }
    }

    fn emit(sender: &UnboundedSender<TransportEvent>, event: TransportEvent) {
        if let Err(e) = sender.send(event) {
            debug!("Dropped transport event, no receiver: {:?}", e.0);
        }
    }
}

#[async_trait]
impl Transport for MqttClient {
    async fn subscribe(&self, topic: &str) -> Result<(), MQTTError> {
        self.request(AckKind::Subscribe, topic).await?;
        debug!(topic = %topic, "Subscribed topic");
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), MQTTError> {
        self.request(AckKind::Unsubscribe, topic).await?;
        debug!(topic = %topic, "Unsubscribed topic");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::SeqCst)
    }
}
