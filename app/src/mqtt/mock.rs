use super::Transport;
use crate::error::MQTTError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Records every broker request, rejects the topics it was told to.
#[derive(Default)]
pub struct RecordingTransport {
    connected: AtomicBool,
    subscribes: Mutex<Vec<String>>,
    unsubscribes: Mutex<Vec<String>>,
    rejected: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn connected() -> Self {
        let transport = Self::default();
        transport.set_connected(true);
        transport
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn reject(&self, topic: &str) {
        self.rejected.lock().insert(topic.to_owned());
    }

    pub fn subscribes(&self) -> Vec<String> {
        self.subscribes.lock().clone()
    }

    pub fn unsubscribes(&self) -> Vec<String> {
        self.unsubscribes.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn subscribe(&self, topic: &str) -> Result<(), MQTTError> {
        self.subscribes.lock().push(topic.to_owned());
        if self.rejected.lock().contains(topic) {
            return Err(MQTTError::SubscribeRejected(topic.to_owned()));
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), MQTTError> {
        self.unsubscribes.lock().push(topic.to_owned());
        if self.rejected.lock().contains(topic) {
            return Err(MQTTError::Timeout(format!("UNSUBACK on {}", topic)));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
