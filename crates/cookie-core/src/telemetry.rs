//! Auxiliary telemetry shown alongside the plugin and app lists.

use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};

/// Shared key/value board that drivers and embedders publish readings to.
///
/// Cloning shares the same board.
#[derive(Debug, Clone, Default)]
pub struct TelemetryBoard {
    values: Arc<RwLock<Map<String, Value>>>,
}

impl TelemetryBoard {
    pub fn new(initial: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(RwLock::new(initial)),
        }
    }

    /// Set one reading, replacing any previous value.
    pub fn publish(&self, key: impl Into<String>, value: impl Into<Value>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value.into());
        }
    }

    /// Drop a reading.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().ok().and_then(|mut v| v.remove(key))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().ok().and_then(|v| v.get(key).cloned())
    }

    /// Copy of every current reading.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.values
            .read()
            .map(|values| values.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_and_snapshot() {
        let board = TelemetryBoard::default();
        board.publish("arduino_data", "MOVE 3 4");
        board.publish("temp", 21.5);

        let snapshot = board.snapshot();
        assert_eq!(snapshot["arduino_data"], "MOVE 3 4");
        assert_eq!(snapshot["temp"], json!(21.5));
    }

    #[test]
    fn test_clones_share_readings() {
        let board = TelemetryBoard::default();
        let writer = board.clone();
        writer.publish("arduino_data", "CLICK");
        assert_eq!(board.get("arduino_data"), Some(json!("CLICK")));

        assert!(board.remove("arduino_data").is_some());
        assert!(writer.get("arduino_data").is_none());
    }
}
