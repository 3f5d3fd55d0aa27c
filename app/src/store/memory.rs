//! In-memory storage collaborators with fault injection for unit tests.

use super::{DeviceCatalog, DeviceRegistry, ReadingStore, SensorRegistry};
use crate::error::DBError;
use ambiental_core::{
    Device, DeviceStatus, NewDevice, NewSensor, Reading, ReadingKind, Sensor, SensorStatus,
    DEFAULT_DEVICE_KIND,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    devices: Mutex<Vec<Device>>,
    sensors: Mutex<Vec<Sensor>>,
    readings: Mutex<Vec<Reading>>,
    failing_kinds: Mutex<HashSet<ReadingKind>>,
    fail_devices: Mutex<bool>,
    fail_sensor_creation: Mutex<bool>,
    fail_touch: Mutex<bool>,
    fail_sensors: Mutex<bool>,
    pub sensor_creations: AtomicUsize,
    pub touches: AtomicUsize,
}

fn unavailable() -> DBError {
    DBError::Unavailable("connection refused".to_owned())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, name: &str, topic: &str, status: DeviceStatus) -> Device {
        let mut devices = self.devices.lock();
        let device = Device {
            id: devices.iter().map(|d| d.id).max().unwrap_or(0) + 1,
            name: name.to_owned(),
            kind: DEFAULT_DEVICE_KIND.to_owned(),
            topic: topic.to_owned(),
            mac_address: None,
            description: None,
            status,
            last_seen: None,
        };
        devices.push(device.clone());
        device
    }

    pub fn add_sensor(&self, name: &str, device_id: Option<i32>, status: SensorStatus) -> Sensor {
        let mut sensors = self.sensors.lock();
        let sensor = Sensor {
            id: sensors.len() as i32 + 1,
            name: name.to_owned(),
            kind: "temperature".to_owned(),
            model: Some("DHT22".to_owned()),
            status,
            environment_id: 1,
            device_id,
        };
        sensors.push(sensor.clone());
        sensor
    }

    pub fn device(&self, device_id: i32) -> Option<Device> {
        self.devices.lock().iter().find(|d| d.id == device_id).cloned()
    }

    pub fn sensors(&self) -> Vec<Sensor> {
        self.sensors.lock().clone()
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.readings.lock().clone()
    }

    pub fn fail_reading(&self, kind: ReadingKind) {
        self.failing_kinds.lock().insert(kind);
    }

    pub fn fail_devices(&self, fail: bool) {
        *self.fail_devices.lock() = fail;
    }

    pub fn fail_sensor_creation(&self, fail: bool) {
        *self.fail_sensor_creation.lock() = fail;
    }

    pub fn fail_touch(&self, fail: bool) {
        *self.fail_touch.lock() = fail;
    }

    /// Fails the sensor lookups, creation is controlled separately.
    pub fn fail_sensors(&self, fail: bool) {
        *self.fail_sensors.lock() = fail;
    }
}

#[async_trait]
impl DeviceRegistry for MemoryStore {
    async fn find_active_devices(&self) -> Result<Vec<Device>, DBError> {
        if *self.fail_devices.lock() {
            return Err(unavailable());
        }
        Ok(self
            .devices
            .lock()
            .iter()
            .filter(|d| d.is_active())
            .cloned()
            .collect())
    }

    async fn find_device_by_topic(&self, topic: &str) -> Result<Option<Device>, DBError> {
        if *self.fail_devices.lock() {
            return Err(unavailable());
        }
        Ok(self.devices.lock().iter().find(|d| d.topic == topic).cloned())
    }

    async fn touch_device(&self, device_id: i32, timestamp: DateTime<Utc>) -> Result<(), DBError> {
        self.touches.fetch_add(1, Ordering::SeqCst);
        if *self.fail_touch.lock() {
            return Err(unavailable());
        }
        let mut devices = self.devices.lock();
        let device = devices
            .iter_mut()
            .find(|d| d.id == device_id)
            .ok_or(DBError::DeviceNotFound(device_id))?;
        device.last_seen = Some(timestamp);
        device.status = DeviceStatus::Active;
        Ok(())
    }
}

#[async_trait]
impl DeviceCatalog for MemoryStore {
    async fn list_devices(&self) -> Result<Vec<Device>, DBError> {
        if *self.fail_devices.lock() {
            return Err(unavailable());
        }
        Ok(self.devices.lock().clone())
    }

    async fn find_device(&self, device_id: i32) -> Result<Option<Device>, DBError> {
        Ok(self.device(device_id))
    }

    async fn insert_device(&self, new_device: &NewDevice) -> Result<Device, DBError> {
        if *self.fail_devices.lock() {
            return Err(unavailable());
        }
        let mut devices = self.devices.lock();
        let device = Device {
            id: devices.iter().map(|d| d.id).max().unwrap_or(0) + 1,
            name: new_device.name.clone(),
            kind: new_device.kind_or_default().to_owned(),
            topic: new_device.topic.clone(),
            mac_address: new_device.mac_address.clone(),
            description: new_device.description.clone(),
            status: new_device.status_or_default(),
            last_seen: None,
        };
        devices.push(device.clone());
        Ok(device)
    }

    async fn update_device(&self, updated: &Device) -> Result<Device, DBError> {
        let mut devices = self.devices.lock();
        let device = devices
            .iter_mut()
            .find(|d| d.id == updated.id)
            .ok_or(DBError::DeviceNotFound(updated.id))?;
        *device = updated.clone();
        Ok(updated.clone())
    }

    async fn delete_device(&self, device_id: i32) -> Result<(), DBError> {
        let mut devices = self.devices.lock();
        let before = devices.len();
        devices.retain(|d| d.id != device_id);
        if devices.len() == before {
            return Err(DBError::DeviceNotFound(device_id));
        }
        drop(devices);
        for sensor in self.sensors.lock().iter_mut() {
            if sensor.device_id == Some(device_id) {
                sensor.device_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SensorRegistry for MemoryStore {
    async fn find_active_sensors_by_device(&self, device_id: i32) -> Result<Vec<Sensor>, DBError> {
        if *self.fail_sensors.lock() {
            return Err(unavailable());
        }
        let mut bound: Vec<Sensor> = self
            .sensors
            .lock()
            .iter()
            .filter(|s| s.device_id == Some(device_id) && s.status == SensorStatus::Active)
            .cloned()
            .collect();
        bound.sort_by_key(|s| s.id);
        Ok(bound)
    }

    async fn find_sensor_by_name(&self, name: &str) -> Result<Option<Sensor>, DBError> {
        if *self.fail_sensors.lock() {
            return Err(unavailable());
        }
        Ok(self
            .sensors
            .lock()
            .iter()
            .filter(|s| s.name == name)
            .min_by_key(|s| s.id)
            .cloned())
    }

    async fn create_sensor(&self, new_sensor: NewSensor) -> Result<Sensor, DBError> {
        if *self.fail_sensor_creation.lock() {
            return Err(unavailable());
        }
        // widen the window between lookup and insert
        tokio::task::yield_now().await;

        self.sensor_creations.fetch_add(1, Ordering::SeqCst);
        let mut sensors = self.sensors.lock();
        let sensor = Sensor {
            id: sensors.len() as i32 + 1,
            name: new_sensor.name,
            kind: new_sensor.kind,
            model: new_sensor.model,
            status: new_sensor.status,
            environment_id: new_sensor.environment_id,
            device_id: new_sensor.device_id,
        };
        sensors.push(sensor.clone());
        Ok(sensor)
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn create_reading(
        &self,
        sensor_id: i32,
        kind: ReadingKind,
        value: f64,
        unit: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Reading, DBError> {
        if self.failing_kinds.lock().contains(&kind) {
            return Err(unavailable());
        }
        let mut readings = self.readings.lock();
        let reading = Reading {
            id: readings.len() as i64 + 1,
            sensor_id,
            kind: kind.as_str().to_owned(),
            value,
            unit: Some(unit.to_owned()),
            timestamp,
        };
        readings.push(reading.clone());
        Ok(reading)
    }
}
