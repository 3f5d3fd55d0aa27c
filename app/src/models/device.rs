use crate::error::DBError;
use ambiental_core::{Device, DeviceStatus, NewDevice};
use chrono::{DateTime, Utc};

#[derive(sqlx::FromRow, Debug)]
pub struct DeviceDao {
    pub(crate) id: i32,
    pub(crate) name: String,
    pub(crate) kind: String,
    pub(crate) topic: String,
    pub(crate) mac_address: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) status: String,
    pub(crate) last_seen: Option<DateTime<Utc>>,
}

impl TryFrom<DeviceDao> for Device {
    type Error = DBError;

    fn try_from(dao: DeviceDao) -> Result<Self, Self::Error> {
        Ok(Device {
            id: dao.id,
            status: dao.status.parse()?,
            name: dao.name,
            kind: dao.kind,
            topic: dao.topic,
            mac_address: dao.mac_address,
            description: dao.description,
            last_seen: dao.last_seen,
        })
    }
}

const COLUMNS: &str = "id, name, kind, topic, mac_address, description, status, last_seen";

fn into_devices(daos: Vec<DeviceDao>) -> Result<Vec<Device>, DBError> {
    daos.into_iter().map(Device::try_from).collect()
}

pub async fn insert(conn: &sqlx::PgPool, device: &NewDevice) -> Result<Device, DBError> {
    sql_stmnt!(
        DeviceDao,
        &format!(
            "INSERT INTO devices (name, kind, topic, mac_address, description, status)
                VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            COLUMNS
        ),
        &device.name,
        device.kind_or_default(),
        &device.topic,
        &device.mac_address,
        &device.description,
        device.status_or_default().as_str()
    )
    .fetch_one(conn)
    .await?
    .try_into()
}

/// READ devices, newest first
pub async fn read(conn: &sqlx::PgPool) -> Result<Vec<Device>, DBError> {
    let daos = sql_stmnt!(
        DeviceDao,
        &format!("SELECT {} FROM devices ORDER BY created_at DESC, id DESC", COLUMNS)
    )
    .fetch_all(conn)
    .await?;
    into_devices(daos)
}

pub async fn read_active(conn: &sqlx::PgPool) -> Result<Vec<Device>, DBError> {
    let daos = sql_stmnt!(
        DeviceDao,
        &format!("SELECT {} FROM devices WHERE status = $1 ORDER BY name ASC", COLUMNS),
        DeviceStatus::Active.as_str()
    )
    .fetch_all(conn)
    .await?;
    into_devices(daos)
}

pub async fn find(conn: &sqlx::PgPool, device_id: i32) -> Result<Option<Device>, DBError> {
    sql_stmnt!(
        DeviceDao,
        &format!("SELECT {} FROM devices WHERE id = $1", COLUMNS),
        device_id
    )
    .fetch_optional(conn)
    .await?
    .map(Device::try_from)
    .transpose()
}

pub async fn find_by_topic(conn: &sqlx::PgPool, topic: &str) -> Result<Option<Device>, DBError> {
    sql_stmnt!(
        DeviceDao,
        &format!("SELECT {} FROM devices WHERE topic = $1", COLUMNS),
        topic
    )
    .fetch_optional(conn)
    .await?
    .map(Device::try_from)
    .transpose()
}

/// Stamps `last_seen` and forces the device back to active.
pub async fn touch(
    conn: &sqlx::PgPool,
    device_id: i32,
    timestamp: DateTime<Utc>,
) -> Result<(), DBError> {
    let result = sql_stmnt!(
        "UPDATE devices SET last_seen = $1, status = $2 WHERE id = $3",
        timestamp,
        DeviceStatus::Active.as_str(),
        device_id
    )
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DBError::DeviceNotFound(device_id));
    }
    Ok(())
}

pub async fn update(conn: &sqlx::PgPool, device: &Device) -> Result<Device, DBError> {
    sql_stmnt!(
        DeviceDao,
        &format!(
            "UPDATE devices SET name = $1, kind = $2, topic = $3, mac_address = $4,
                description = $5, status = $6
                WHERE id = $7 RETURNING {}",
            COLUMNS
        ),
        &device.name,
        &device.kind,
        &device.topic,
        &device.mac_address,
        &device.description,
        device.status.as_str(),
        device.id
    )
    .fetch_optional(conn)
    .await?
    .ok_or(DBError::DeviceNotFound(device.id))?
    .try_into()
}

pub async fn delete(conn: &sqlx::PgPool, remove_id: i32) -> Result<(), DBError> {
    let result = sql_stmnt!("DELETE FROM devices WHERE id = $1", remove_id)
        .execute(conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DBError::DeviceNotFound(remove_id));
    }
    Ok(())
}
