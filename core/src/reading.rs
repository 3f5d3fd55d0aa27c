use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Measurement kinds a device payload can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingKind {
    Temperature,
    Humidity,
    Potentiometer,
}

impl ReadingKind {
    /// Persist order for a single message.
    pub const ALL: [ReadingKind; 3] = [
        ReadingKind::Temperature,
        ReadingKind::Humidity,
        ReadingKind::Potentiometer,
    ];

    /// Key as published by the firmware, case-sensitive.
    pub fn payload_key(&self) -> &'static str {
        match self {
            ReadingKind::Temperature => "Temp",
            ReadingKind::Humidity => "Umidade",
            ReadingKind::Potentiometer => "Potenciometro",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingKind::Temperature => "temperature",
            ReadingKind::Humidity => "humidity",
            ReadingKind::Potentiometer => "potentiometer",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ReadingKind::Temperature => "°C",
            ReadingKind::Humidity => "%",
            ReadingKind::Potentiometer => "%",
        }
    }
}

impl fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    pub sensor_id: i32,
    pub kind: String,
    pub value: f64,
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
}
