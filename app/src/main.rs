use ambiental::config::CONFIG;
use ambiental::mqtt::{MqttClient, MqttSettings};
use ambiental::observer::{device::DeviceService, Coordinator, ObserverSettings};
use ambiental::store::PgStore;
use ambiental::{logging, models};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    info!("Starting ambiental {}", ambiental_core::CORE_VERSION);

    let conn = models::establish_db_connection(
        CONFIG.database_url(),
        CONFIG.database_max_connections(),
    )
    .await?;
    models::migrate(&conn).await?;
    models::check_schema(&conn).await?;
    if models::environment::find(&conn, CONFIG.fallback_environment_id())
        .await?
        .is_none()
    {
        warn!(
            "Environment {} is missing, fallback sensor creation will fail",
            CONFIG.fallback_environment_id()
        );
    }
    let store = Arc::new(PgStore::new(conn));

    let shutdown = CancellationToken::new();
    let mqtt_client = Arc::new(MqttClient::new(
        MqttSettings::from_config(&CONFIG),
        shutdown.clone(),
    )?);
    info!("MQTT client id {}", mqtt_client.client_id());

    let coordinator = Coordinator::new(
        mqtt_client.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        ObserverSettings::from_config(&CONFIG),
        shutdown.clone(),
    );
    let devices = DeviceService::new(store.clone(), coordinator.clone());
    match devices.active().await {
        Ok(active) => info!("{} active devices registered", active.len()),
        Err(e) => error!("Failed listing devices: {}", e),
    }

    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    coordinator.start();
    let mqtt_loop = tokio::spawn(MqttClient::dispatch_event_loop(mqtt_client.clone(), sender));
    let coordinator_loop = tokio::spawn(Coordinator::dispatch_event_loop(
        coordinator.clone(),
        receiver,
    ));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed listening for ctrl-c: {}", e);
            }
            info!("Received ctrl-c");
        }
        _ = shutdown.cancelled() => (),
    }

    coordinator.shutdown();
    let _ = tokio::join!(mqtt_loop, coordinator_loop);
    info!("Shutdown complete");
    Ok(())
}
