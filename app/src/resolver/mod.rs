use crate::config::Config;
use crate::error::ResolveError;
use crate::store::{DeviceRegistry, SensorRegistry};
use ambiental_core::{Device, DeviceStatus, NewSensor, Sensor, SensorStatus};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};


/// Singleton sensor that receives readings of devices without a bound sensor.
#[derive(Debug, Clone)]
pub struct FallbackSensor {
    pub name: String,
    pub environment_id: i32,
}

impl FallbackSensor {
    pub const KIND: &'static str = "Ambiental";
    pub const MODEL: &'static str = "ESP32";

    pub fn from_config(config: &Config) -> Self {
        FallbackSensor {
            name: config.fallback_sensor_name().to_owned(),
            environment_id: config.fallback_environment_id(),
        }
    }

    fn new_sensor(&self, device_id: Option<i32>) -> NewSensor {
        NewSensor {
            name: self.name.clone(),
            kind: Self::KIND.to_owned(),
            model: Some(Self::MODEL.to_owned()),
            status: SensorStatus::Active,
            environment_id: self.environment_id,
            device_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub sensor: Sensor,
    /// The device owning the topic, already touched.
    pub device: Option<Device>,
    pub is_fallback: bool,
}

pub struct Resolver {
    devices: Arc<dyn DeviceRegistry>,
    sensors: Arc<dyn SensorRegistry>,
    fallback: FallbackSensor,
    fallback_lock: Mutex<()>,
}

impl Resolver {
    pub fn new(
        devices: Arc<dyn DeviceRegistry>,
        sensors: Arc<dyn SensorRegistry>,
        fallback: FallbackSensor,
    ) -> Self {
        Resolver {
            devices,
            sensors,
            fallback,
            fallback_lock: Mutex::new(()),
        }
    }

    /// Maps an inbound topic to the sensor receiving its readings.
    ///
    /// The owning device gets its last-seen stamped and is forced active. Of several bound
    /// sensors only the first one is used. Without a bound sensor the fallback sensor is used,
    /// created on first use.
    pub async fn resolve(&self, topic: &str) -> Result<Resolution, ResolveError> {
        let device = match self
            .devices
            .find_device_by_topic(topic)
            .await
            .map_err(ResolveError::Lookup)?
        {
            Some(device) => Some(self.touch(device).await),
            None => {
                debug!(topic = %topic, "No device registered for topic");
                None
            }
        };

        if let Some(device_id) = device.as_ref().map(|d| d.id) {
            let bound = self
                .sensors
                .find_active_sensors_by_device(device_id)
                .await
                .map_err(ResolveError::Lookup)?;
            if bound.len() > 1 {
                debug!(
                    device_id = device_id,
                    "{} sensors bound, using the first", bound.len()
                );
            }
            if let Some(sensor) = bound.into_iter().next() {
                return Ok(Resolution {
                    sensor,
                    device,
                    is_fallback: false,
                });
            }
        }

        let sensor = self.fallback_sensor(device.as_ref()).await?;
        Ok(Resolution {
            sensor,
            device,
            is_fallback: true,
        })
    }

    async fn touch(&self, mut device: Device) -> Device {
        let now = Utc::now();
        if let Err(e) = self.devices.touch_device(device.id, now).await {
            error!(device_id = device.id, "Failed updating device status: {}", e);
        }
        device.last_seen = Some(now);
        device.status = DeviceStatus::Active;
        device
    }

    async fn fallback_sensor(&self, device: Option<&Device>) -> Result<Sensor, ResolveError> {
        // find-or-create must not race with itself
        let _guard = self.fallback_lock.lock().await;

        if let Some(sensor) = self
            .sensors
            .find_sensor_by_name(&self.fallback.name)
            .await
            .map_err(ResolveError::Lookup)?
        {
            return Ok(sensor);
        }

        let created = self
            .sensors
            .create_sensor(self.fallback.new_sensor(device.map(|d| d.id)))
            .await
            .map_err(ResolveError::FallbackCreation)?;
        info!(
            sensor_id = created.id,
            device_id = ?created.device_id,
            "Created fallback sensor {}", created.name
        );
        Ok(created)
    }
}
