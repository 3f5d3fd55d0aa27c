use crate::error::{DBError, MQTTError};
use crate::mqtt::Transport;
use crate::store::DeviceRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};


/// Outcome of subscribing every active device topic.
#[derive(Debug, Default)]
pub struct BulkSubscribeReport {
    pub devices: usize,
    pub subscribed: usize,
    pub failed: Vec<(String, MQTTError)>,
}

/// The set of topics the broker acknowledged for this session.
///
/// A topic is only recorded after its SUBACK and only forgotten after its UNSUBACK.
/// The lock is held across the broker round-trip, so all mutations are serialized.
pub struct TopicRegistry {
    transport: Arc<dyn Transport>,
    subscribed: Mutex<HashSet<String>>,
}

impl TopicRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        TopicRegistry {
            transport,
            subscribed: Mutex::new(HashSet::new()),
        }
    }

    pub async fn subscribe_topic(&self, topic: &str) -> Result<(), MQTTError> {
        let mut subscribed = self.subscribed.lock().await;
        if subscribed.contains(topic) {
            debug!(topic = %topic, "Already subscribed");
            return Ok(());
        }

        if let Err(e) = self.transport.subscribe(topic).await {
            error!(topic = %topic, "Failed subscribing topic: {}", e);
            return Err(e);
        }
        subscribed.insert(topic.to_owned());
        info!(topic = %topic, "Subscribed topic");
        Ok(())
    }

    pub async fn unsubscribe_topic(&self, topic: &str) -> Result<(), MQTTError> {
        let mut subscribed = self.subscribed.lock().await;
        if !subscribed.contains(topic) {
            debug!(topic = %topic, "Not subscribed");
            return Ok(());
        }

        if let Err(e) = self.transport.unsubscribe(topic).await {
            error!(topic = %topic, "Failed unsubscribing topic: {}", e);
            return Err(e);
        }
        subscribed.remove(topic);
        info!(topic = %topic, "Unsubscribed topic");
        Ok(())
    }

    /// Subscribes the topic of every active device, a failing device never aborts the batch.
    pub async fn bulk_subscribe_active_devices(
        &self,
        devices: &dyn DeviceRegistry,
    ) -> Result<BulkSubscribeReport, DBError> {
        let active = devices.find_active_devices().await?;
        let mut report = BulkSubscribeReport {
            devices: active.len(),
            ..Default::default()
        };

        for device in active {
            let topic = device.topic.as_str();
            if topic.trim().is_empty() {
                debug!(device_id = device.id, "Device without topic");
                continue;
            }
            match self.subscribe_topic(topic).await {
                Ok(()) => report.subscribed += 1,
                Err(e) => report.failed.push((topic.to_owned(), e)),
            }
        }

        info!(
            "Subscribed {}/{} device topics",
            report.subscribed, report.devices
        );
        Ok(report)
    }

    /// Forgets the session's topics after the broker connection was lost.
    pub async fn reset(&self) -> usize {
        let mut subscribed = self.subscribed.lock().await;
        let count = subscribed.len();
        subscribed.clear();
        count
    }

    pub async fn contains(&self, topic: &str) -> bool {
        self.subscribed.lock().await.contains(topic)
    }

    pub async fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscribed.lock().await.iter().cloned().collect();
        topics.sort();
        topics
    }
}
