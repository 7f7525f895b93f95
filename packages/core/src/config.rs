//! Channel configuration.

use serde::{Deserialize, Serialize};

use crate::WriteBufferConfig;

const PUSHBACK_CAPACITY_VAR: &str = "CHANNELFS_PUSHBACK_CAPACITY";
const WRITE_BUFFER_VAR: &str = "CHANNELFS_WRITE_BUFFER";
const WRITE_BUFFER_AUTORESIZE_VAR: &str = "CHANNELFS_WRITE_BUFFER_AUTORESIZE";

/// Tunables applied when a channel is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Capacity of the pushback buffer in bytes.
    pub pushback_capacity: usize,
    /// Write coalescing, off when `None`.
    pub write_buffer: Option<WriteBufferConfig>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            pushback_capacity: 1024,
            write_buffer: None,
        }
    }
}

impl ChannelConfig {
    /// Defaults overlaid with `CHANNELFS_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    fn overlay<F>(mut self, var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &str| -> Option<usize> {
            let value = var(name)?;
            match value.trim().parse() {
                Ok(n) => Some(n),
                Err(_) => {
                    log::warn!("ignoring {}={:?}: not a byte count", name, value);
                    None
                }
            }
        };

        if let Some(capacity) = number(PUSHBACK_CAPACITY_VAR) {
            self.pushback_capacity = capacity;
        }

        if let Some(capacity) = number(WRITE_BUFFER_VAR) {
            self.write_buffer = if capacity == 0 {
                None
            } else {
                Some(WriteBufferConfig {
                    capacity,
                    auto_resize: false,
                })
            };
        }

        if let Some(buffer) = self.write_buffer.as_mut() {
            if let Some(flag) = var(WRITE_BUFFER_AUTORESIZE_VAR) {
                buffer.auto_resize = matches!(flag.trim(), "1" | "true" | "yes" | "on");
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn overlay_works() {
        let config = ChannelConfig::default().overlay(env(&[
            (PUSHBACK_CAPACITY_VAR, "64"),
            (WRITE_BUFFER_VAR, "512"),
            (WRITE_BUFFER_AUTORESIZE_VAR, "true"),
        ]));
        assert_eq!(config.pushback_capacity, 64);
        assert_eq!(
            config.write_buffer,
            Some(WriteBufferConfig {
                capacity: 512,
                auto_resize: true
            })
        );
    }

    #[test]
    fn zero_disables_write_buffer() {
        let config = ChannelConfig {
            write_buffer: Some(WriteBufferConfig::default()),
            ..ChannelConfig::default()
        }
        .overlay(env(&[(WRITE_BUFFER_VAR, "0")]));
        assert!(config.write_buffer.is_none());
    }

    #[test]
    fn bad_values_are_ignored() {
        let config = ChannelConfig::default().overlay(env(&[(PUSHBACK_CAPACITY_VAR, "lots")]));
        assert_eq!(config.pushback_capacity, 1024);
    }

    #[test]
    fn json_round_trip_with_defaults() {
        let config: ChannelConfig = serde_json::from_str(r#"{"pushback_capacity": 8}"#).unwrap();
        assert_eq!(config.pushback_capacity, 8);
        assert!(config.write_buffer.is_none());

        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<ChannelConfig>(&text).unwrap(), config);
    }
}
