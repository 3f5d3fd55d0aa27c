use crate::error::DBError;
use ambiental_core::{NewSensor, Sensor, SensorStatus};

#[derive(sqlx::FromRow, Debug)]
pub struct SensorDao {
    pub(crate) id: i32,
    pub(crate) name: String,
    pub(crate) kind: String,
    pub(crate) model: Option<String>,
    pub(crate) status: String,
    pub(crate) environment_id: i32,
    pub(crate) device_id: Option<i32>,
}

impl TryFrom<SensorDao> for Sensor {
    type Error = DBError;

    fn try_from(dao: SensorDao) -> Result<Self, Self::Error> {
        Ok(Sensor {
            id: dao.id,
            status: dao.status.parse()?,
            name: dao.name,
            kind: dao.kind,
            model: dao.model,
            environment_id: dao.environment_id,
            device_id: dao.device_id,
        })
    }
}

const COLUMNS: &str = "id, name, kind, model, status, environment_id, device_id";

pub async fn insert(conn: &sqlx::PgPool, sensor: &NewSensor) -> Result<Sensor, DBError> {
    sql_stmnt!(
        SensorDao,
        &format!(
            "INSERT INTO sensors (name, kind, model, status, environment_id, device_id)
                VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            COLUMNS
        ),
        &sensor.name,
        &sensor.kind,
        &sensor.model,
        sensor.status.as_str(),
        sensor.environment_id,
        sensor.device_id
    )
    .fetch_one(conn)
    .await?
    .try_into()
}

/// Ordered by id, the first row is the ingestion target.
pub async fn read_active_by_device(
    conn: &sqlx::PgPool,
    device_id: i32,
) -> Result<Vec<Sensor>, DBError> {
    sql_stmnt!(
        SensorDao,
        &format!(
            "SELECT {} FROM sensors WHERE device_id = $1 AND status = $2 ORDER BY id ASC",
            COLUMNS
        ),
        device_id,
        SensorStatus::Active.as_str()
    )
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(Sensor::try_from)
    .collect()
}

pub async fn find_by_name(conn: &sqlx::PgPool, name: &str) -> Result<Option<Sensor>, DBError> {
    sql_stmnt!(
        SensorDao,
        &format!(
            "SELECT {} FROM sensors WHERE name = $1 ORDER BY id ASC LIMIT 1",
            COLUMNS
        ),
        name
    )
    .fetch_optional(conn)
    .await?
    .map(Sensor::try_from)
    .transpose()
}

pub async fn delete(conn: &sqlx::PgPool, remove_id: i32) -> Result<(), DBError> {
    sql_stmnt!("DELETE FROM sensors WHERE id = $1", remove_id)
        .execute(conn)
        .await?;
    Ok(())
}
