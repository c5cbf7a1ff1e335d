//! Synthetic telemetry readings for the simulated station
//!
//! One reading is produced per publish cycle. Field values are drawn
//! independently from fixed half-open ranges matching the physical sensors the
//! station pretends to carry.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One telemetry sample, serialized to the exact wire field names the cloud
/// platform ingests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryReading {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    /// Degrees Celsius, [-50, 50)
    pub temperature: i32,
    /// Relative percent, [0, 100)
    pub humidity: i32,
    /// Degrees, [0, 360)
    pub wind_direction: i32,
    /// km/h, [0, 100)
    pub wind_intensity: i32,
    /// mm, [0, 50)
    pub rain_height: i32,
    /// Seconds since epoch
    pub date: i64,
}

/// Produces one reading per invocation. Randomness is the only
/// non-determinism; timestamps come from the system clock and are
/// non-decreasing across consecutive readings.
#[derive(Debug, Clone)]
pub struct TelemetryGenerator {
    device_id: String,
}

impl TelemetryGenerator {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Draw a fresh reading stamped with the current time.
    pub fn next_reading(&self) -> TelemetryReading {
        let mut rng = rand::thread_rng();
        TelemetryReading {
            device_id: self.device_id.clone(),
            temperature: rng.gen_range(-50..50),
            humidity: rng.gen_range(0..100),
            wind_direction: rng.gen_range(0..360),
            wind_intensity: rng.gen_range(0..100),
            rain_height: rng.gen_range(0..50),
            date: Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_within_documented_ranges() {
        let generator = TelemetryGenerator::new("station");
        for _ in 0..1000 {
            let reading = generator.next_reading();
            assert!((-50..50).contains(&reading.temperature));
            assert!((0..100).contains(&reading.humidity));
            assert!((0..360).contains(&reading.wind_direction));
            assert!((0..100).contains(&reading.wind_intensity));
            assert!((0..50).contains(&reading.rain_height));
        }
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let generator = TelemetryGenerator::new("station");
        let mut previous = generator.next_reading().date;
        for _ in 0..100 {
            let current = generator.next_reading().date;
            assert!(current >= previous, "timestamp went backwards");
            previous = current;
        }
    }

    #[test]
    fn test_wire_field_names() {
        let generator = TelemetryGenerator::new("station");
        let json = serde_json::to_value(generator.next_reading()).unwrap();

        let object = json.as_object().unwrap();
        for key in [
            "deviceId",
            "temperature",
            "humidity",
            "wind_direction",
            "wind_intensity",
            "rain_height",
            "date",
        ] {
            assert!(object.contains_key(key), "missing wire field {key}");
        }
        assert_eq!(object.len(), 7);
        assert_eq!(object["deviceId"], "station");
    }
}
