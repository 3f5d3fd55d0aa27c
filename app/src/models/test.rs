use ambiental_core::{DeviceStatus, NewDevice, NewSensor, ReadingKind, SensorStatus};
use chrono::{Duration, Utc};

use super::device;
use super::environment;
use super::reading;
use super::sensor;
use super::*;
use crate::config::CONFIG;

async fn connect() -> sqlx::PgPool {
    let conn = establish_db_connection(CONFIG.database_url(), 2)
        .await
        .unwrap();
    migrate(&conn).await.unwrap();
    conn
}

fn unique_topic(prefix: &str) -> String {
    format!("test/{}/{}", prefix, Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

#[tokio::test]
#[ignore = "requires a running postgres at DATABASE_URL"]
async fn test_db_connection() {
    let conn = connect().await;
    check_schema(&conn).await.unwrap();
    assert!(environment::find(&conn, 1).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires a running postgres at DATABASE_URL"]
async fn crud_devices() {
    let conn = connect().await;
    let topic = unique_topic("crud");

    // create
    let created = device::insert(&conn, &NewDevice::new("ESP32 Sala", &topic))
        .await
        .unwrap();
    assert_eq!("ESP32", created.kind);
    assert_eq!(DeviceStatus::Active, created.status);
    assert!(created.last_seen.is_none());

    // duplicate topic
    assert!(device::insert(&conn, &NewDevice::new("Other", &topic))
        .await
        .is_err());

    // touch
    let now = Utc::now();
    let mut offline = created.clone();
    offline.status = DeviceStatus::Offline;
    device::update(&conn, &offline).await.unwrap();
    device::touch(&conn, created.id, now).await.unwrap();
    let touched = device::find_by_topic(&conn, &topic).await.unwrap().unwrap();
    assert_eq!(DeviceStatus::Active, touched.status);
    assert!(touched.last_seen.is_some());

    // delete
    device::delete(&conn, created.id).await.unwrap();
    assert!(device::find(&conn, created.id).await.unwrap().is_none());
    assert!(device::delete(&conn, created.id).await.is_err());
}

#[tokio::test]
#[ignore = "requires a running postgres at DATABASE_URL"]
async fn crud_sensors_and_readings() {
    let conn = connect().await;
    let dev = device::insert(&conn, &NewDevice::new("ESP32 Lab", unique_topic("readings")))
        .await
        .unwrap();

    let new_sensor = |name: &str| NewSensor {
        name: name.to_owned(),
        kind: "temperature".to_owned(),
        model: Some("DHT22".to_owned()),
        status: SensorStatus::Active,
        environment_id: 1,
        device_id: Some(dev.id),
    };
    let first = sensor::insert(&conn, &new_sensor("first")).await.unwrap();
    let second = sensor::insert(&conn, &new_sensor("second")).await.unwrap();

    let bound = sensor::read_active_by_device(&conn, dev.id).await.unwrap();
    assert_eq!(vec![first.id, second.id], bound.iter().map(|s| s.id).collect::<Vec<_>>());

    let now = Utc::now();
    reading::insert(&conn, first.id, ReadingKind::Temperature, 24.5, "°C", now)
        .await
        .unwrap();
    reading::insert(&conn, first.id, ReadingKind::Humidity, 60.0, "%", now)
        .await
        .unwrap();

    let readings = reading::get(&conn, first.id, now - Duration::minutes(1), now + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(2, readings.len());
    let latest = reading::get_latest(&conn, first.id, ReadingKind::Humidity)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(60.0, latest.value);

    // deleting the device unbinds its sensors
    device::delete(&conn, dev.id).await.unwrap();
    assert!(sensor::read_active_by_device(&conn, dev.id).await.unwrap().is_empty());
    sensor::delete(&conn, first.id).await.unwrap();
    sensor::delete(&conn, second.id).await.unwrap();
}
