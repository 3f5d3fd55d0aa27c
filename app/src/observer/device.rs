use super::Coordinator;
use crate::error::RegistryError;
use crate::store::DeviceCatalog;
use ambiental_core::{Device, DeviceUpdate, NewDevice};
use std::sync::Arc;
use tracing::{info, warn};

/// Device administration that keeps broker subscriptions in sync with the stored devices.
pub struct DeviceService {
    catalog: Arc<dyn DeviceCatalog>,
    coordinator: Arc<Coordinator>,
}

impl DeviceService {
    pub fn new(catalog: Arc<dyn DeviceCatalog>, coordinator: Arc<Coordinator>) -> Self {
        DeviceService {
            catalog,
            coordinator,
        }
    }

    pub async fn list(&self) -> Result<Vec<Device>, RegistryError> {
        Ok(self.catalog.list_devices().await?)
    }

    pub async fn active(&self) -> Result<Vec<Device>, RegistryError> {
        Ok(self.catalog.find_active_devices().await?)
    }

    pub async fn register(&self, new_device: NewDevice) -> Result<Device, RegistryError> {
        validate_topic(&new_device.topic)?;
        if self
            .catalog
            .find_device_by_topic(&new_device.topic)
            .await?
            .is_some()
        {
            return Err(RegistryError::DuplicateTopic(new_device.topic));
        }

        let device = self.catalog.insert_device(&new_device).await?;
        info!(device_id = device.id, "Registered device {}", device.name);
        if device.is_active() {
            self.subscribe(&device.topic).await;
        }
        Ok(device)
    }

    pub async fn update(&self, device_id: i32, update: DeviceUpdate) -> Result<Device, RegistryError> {
        let current = self
            .catalog
            .find_device(device_id)
            .await?
            .ok_or(RegistryError::DeviceNotFound(device_id))?;

        let updated = update.apply(&current);
        validate_topic(&updated.topic)?;
        if updated.topic != current.topic {
            if let Some(other) = self.catalog.find_device_by_topic(&updated.topic).await? {
                if other.id != device_id {
                    return Err(RegistryError::DuplicateTopic(updated.topic));
                }
            }
        }

        let stored = self.catalog.update_device(&updated).await?;
        info!(device_id = stored.id, "Updated device {}", stored.name);

        let was_listening = current.is_active();
        let listens = stored.is_active();
        if was_listening && (!listens || stored.topic != current.topic) {
            self.unsubscribe(&current.topic).await;
        }
        if listens && (!was_listening || stored.topic != current.topic) {
            self.subscribe(&stored.topic).await;
        }
        Ok(stored)
    }

    /// Deletes the device, its sensors stay but are no longer bound to it.
    pub async fn remove(&self, device_id: i32) -> Result<Device, RegistryError> {
        let device = self
            .catalog
            .find_device(device_id)
            .await?
            .ok_or(RegistryError::DeviceNotFound(device_id))?;
        self.catalog.delete_device(device_id).await?;
        info!(device_id = device_id, "Removed device {}", device.name);

        self.unsubscribe(&device.topic).await;
        Ok(device)
    }

    // broker failures never undo a stored change
    async fn subscribe(&self, topic: &str) {
        if let Err(e) = self.coordinator.add_topic(topic).await {
            warn!(topic = %topic, "Failed adding topic: {}", e);
        }
    }

    async fn unsubscribe(&self, topic: &str) {
        if let Err(e) = self.coordinator.remove_topic(topic).await {
            warn!(topic = %topic, "Failed removing topic: {}", e);
        }
    }
}

/// Topics are matched byte for byte, padding is rejected rather than stripped.
fn validate_topic(topic: &str) -> Result<(), RegistryError> {
    if topic.trim().is_empty() {
        return Err(RegistryError::EmptyTopic);
    }
    if topic.trim() != topic {
        return Err(RegistryError::PaddedTopic(topic.to_owned()));
    }
    Ok(())
}
