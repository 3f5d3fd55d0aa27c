use crate::error::DBError;
use crate::models::{device, reading, sensor};
use ambiental_core::{Device, NewDevice, NewSensor, Reading, ReadingKind, Sensor};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[cfg(test)]
pub mod memory;

#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn find_active_devices(&self) -> Result<Vec<Device>, DBError>;

    async fn find_device_by_topic(&self, topic: &str) -> Result<Option<Device>, DBError>;

    /// Stamps last-seen and forces the device status to active.
    async fn touch_device(&self, device_id: i32, timestamp: DateTime<Utc>) -> Result<(), DBError>;
}

/// Full device administration, used by the device service.
#[async_trait]
pub trait DeviceCatalog: DeviceRegistry {
    async fn list_devices(&self) -> Result<Vec<Device>, DBError>;

    async fn find_device(&self, device_id: i32) -> Result<Option<Device>, DBError>;

    async fn insert_device(&self, device: &NewDevice) -> Result<Device, DBError>;

    async fn update_device(&self, device: &Device) -> Result<Device, DBError>;

    async fn delete_device(&self, device_id: i32) -> Result<(), DBError>;
}

#[async_trait]
pub trait SensorRegistry: Send + Sync {
    /// Active sensors bound to the device, in ascending id order.
    async fn find_active_sensors_by_device(&self, device_id: i32) -> Result<Vec<Sensor>, DBError>;

    async fn find_sensor_by_name(&self, name: &str) -> Result<Option<Sensor>, DBError>;

    async fn create_sensor(&self, sensor: NewSensor) -> Result<Sensor, DBError>;
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn create_reading(
        &self,
        sensor_id: i32,
        kind: ReadingKind,
        value: f64,
        unit: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Reading, DBError>;
}

/// Postgres backed implementation of all storage collaborators.
#[derive(Clone)]
pub struct PgStore {
    conn: PgPool,
}

impl PgStore {
    pub fn new(conn: PgPool) -> Self {
        PgStore { conn }
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore").finish()
    }
}

#[async_trait]
impl DeviceRegistry for PgStore {
    async fn find_active_devices(&self) -> Result<Vec<Device>, DBError> {
        device::read_active(&self.conn).await
    }

    async fn find_device_by_topic(&self, topic: &str) -> Result<Option<Device>, DBError> {
        device::find_by_topic(&self.conn, topic).await
    }

    async fn touch_device(&self, device_id: i32, timestamp: DateTime<Utc>) -> Result<(), DBError> {
        device::touch(&self.conn, device_id, timestamp).await
    }
}

#[async_trait]
impl DeviceCatalog for PgStore {
    async fn list_devices(&self) -> Result<Vec<Device>, DBError> {
        device::read(&self.conn).await
    }

    async fn find_device(&self, device_id: i32) -> Result<Option<Device>, DBError> {
        device::find(&self.conn, device_id).await
    }

    async fn insert_device(&self, new_device: &NewDevice) -> Result<Device, DBError> {
        device::insert(&self.conn, new_device).await
    }

    async fn update_device(&self, updated: &Device) -> Result<Device, DBError> {
        device::update(&self.conn, updated).await
    }

    async fn delete_device(&self, device_id: i32) -> Result<(), DBError> {
        device::delete(&self.conn, device_id).await
    }
}

#[async_trait]
impl SensorRegistry for PgStore {
    async fn find_active_sensors_by_device(&self, device_id: i32) -> Result<Vec<Sensor>, DBError> {
        sensor::read_active_by_device(&self.conn, device_id).await
    }

    async fn find_sensor_by_name(&self, name: &str) -> Result<Option<Sensor>, DBError> {
        sensor::find_by_name(&self.conn, name).await
    }

    async fn create_sensor(&self, new_sensor: NewSensor) -> Result<Sensor, DBError> {
        sensor::insert(&self.conn, &new_sensor).await
    }
}

#[async_trait]
impl ReadingStore for PgStore {
    async fn create_reading(
        &self,
        sensor_id: i32,
        kind: ReadingKind,
        value: f64,
        unit: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Reading, DBError> {
        reading::insert(&self.conn, sensor_id, kind, value, unit, timestamp).await
    }
}
