use crate::error::DBError;
use ambiental_core::{Reading, ReadingKind};
use chrono::{DateTime, Utc};

#[derive(sqlx::FromRow)]
pub struct ReadingDao {
    pub(crate) id: i64,
    pub(crate) sensor_id: i32,
    pub(crate) kind: String,
    pub(crate) value: f64,
    pub(crate) unit: Option<String>,
    pub(crate) timestamp: DateTime<Utc>,
}

impl From<ReadingDao> for Reading {
    fn from(val: ReadingDao) -> Self {
        Reading {
            id: val.id,
            sensor_id: val.sensor_id,
            kind: val.kind,
            value: val.value,
            unit: val.unit,
            timestamp: val.timestamp,
        }
    }
}

pub async fn insert(
    conn: &sqlx::PgPool,
    sensor_id: i32,
    kind: ReadingKind,
    value: f64,
    unit: &str,
    timestamp: DateTime<Utc>,
) -> Result<Reading, DBError> {
    Ok(sql_stmnt!(
        ReadingDao,
        r#"INSERT INTO readings (sensor_id, kind, value, unit, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, sensor_id, kind, value, unit, timestamp"#,
        sensor_id,
        kind.as_str(),
        value,
        unit,
        timestamp
    )
    .fetch_one(conn)
    .await?
    .into())
}

pub async fn get(
    conn: &sqlx::PgPool,
    sensor_id: i32,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<Reading>, DBError> {
    let mut daos = sql_stmnt!(
        ReadingDao,
        r#"SELECT id, sensor_id, kind, value, unit, timestamp
            FROM readings
            WHERE sensor_id = $1
            AND timestamp >= $2 AND timestamp < $3
            ORDER BY timestamp ASC, id ASC"#,
        sensor_id,
        from,
        until
    )
    .fetch_all(conn)
    .await?;
    Ok(daos.drain(..).map(Reading::from).collect())
}

pub async fn get_latest(
    conn: &sqlx::PgPool,
    sensor_id: i32,
    kind: ReadingKind,
) -> Result<Option<Reading>, DBError> {
    Ok(sql_stmnt!(
        ReadingDao,
        r#"SELECT id, sensor_id, kind, value, unit, timestamp
            FROM readings
            WHERE sensor_id = $1 AND kind = $2
            ORDER BY timestamp DESC, id DESC LIMIT 1"#,
        sensor_id,
        kind.as_str()
    )
    .fetch_optional(conn)
    .await?
    .map(Reading::from))
}
