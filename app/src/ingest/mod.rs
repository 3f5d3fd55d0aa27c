use crate::error::DBError;
use crate::store::ReadingStore;
use ambiental_core::{FieldValue, Reading, ReadingKind, Sensor, TelemetryMessage};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};


#[derive(Debug, Default)]
pub struct IngestReport {
    pub created: Vec<Reading>,
    pub failed: Vec<(ReadingKind, DBError)>,
    pub skipped: Vec<(ReadingKind, String)>,
}

impl IngestReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.failed.is_empty() && self.skipped.is_empty()
    }
}

pub struct Ingestor {
    readings: Arc<dyn ReadingStore>,
}

impl Ingestor {
    pub fn new(readings: Arc<dyn ReadingStore>) -> Self {
        Ingestor { readings }
    }

    /// Persists one reading per recognized field, all stamped with the same ingestion time.
    /// A failing field does not stop the remaining ones.
    pub async fn ingest(&self, sensor: &Sensor, message: &TelemetryMessage) -> IngestReport {
        let timestamp = Utc::now();
        let mut report = IngestReport::default();

        for kind in ReadingKind::ALL {
            let value = match message.value(kind) {
                FieldValue::Absent => continue,
                FieldValue::Number(value) => value,
                FieldValue::Invalid(raw) => {
                    warn!(
                        sensor_id = sensor.id,
                        "Ignored non numeric {}: {}", kind.payload_key(), raw
                    );
                    report.skipped.push((kind, raw));
                    continue;
                }
            };

            match self
                .readings
                .create_reading(sensor.id, kind, value, kind.unit(), timestamp)
                .await
            {
                Ok(reading) => {
                    info!(sensor_id = sensor.id, "Saved {}: {}{}", kind, value, kind.unit());
                    report.created.push(reading);
                }
                Err(e) => {
                    error!(sensor_id = sensor.id, "Failed persisting {}: {}", kind, e);
                    report.failed.push((kind, e));
                }
            }
        }
        report
    }
}
