//! Configuration
//!
//! Responsible for setting default config, reading configs and setting.
//!
//! The following config items can be set:
//!  - HandshakeTimeout: Milliseconds to wait for the server greeting after connecting. If
//!    the greeting hasn't arrived by then we report no targets rather than failing.
//!    Defaults to 1000.
//!  - FramesPageSize: How many stack frames to fetch each time the thread pauses. Defaults
//!    to 25.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use tracing::warn;

/// Config items along with the environment variable that can override them
const ENV_OVERRIDES: [(&str, &str); 2] = [
    ("HandshakeTimeout", "PADRE_HANDSHAKE_TIMEOUT_MS"),
    ("FramesPageSize", "PADRE_FRAMES_PAGE_SIZE"),
];

#[derive(Clone, Debug)]
pub struct Config {
    config: HashMap<&'static str, i64>,
}

impl Config {
    pub fn new() -> Self {
        let mut config = HashMap::new();
        config.insert("HandshakeTimeout", 1000);
        config.insert("FramesPageSize", 25);
        Config { config }
    }

    /// Defaults overridden by any of the `PADRE_*` environment variables that are set
    pub fn from_env() -> Self {
        let mut config = Config::new();

        for &(key, var) in ENV_OVERRIDES.iter() {
            if let Ok(value) = env::var(var) {
                match value.parse::<i64>() {
                    Ok(value) => {
                        config.set_config(key, value);
                    }
                    Err(e) => warn!("Can't understand {}={}: {}", var, value, e),
                }
            }
        }

        config
    }

    /// Get a config items value
    pub fn get_config(&self, key: &str) -> Option<i64> {
        self.config.get(key).copied()
    }

    /// Set a config items value to an integer, returns false if there's no such item
    pub fn set_config(&mut self, key: &str, value: i64) -> bool {
        match self.config.get_mut(key) {
            Some(s) => {
                *s = value;
                true
            }
            None => {
                warn!("Couldn't set unfound config item: {}", key);
                false
            }
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        let millis = self.get_config("HandshakeTimeout").unwrap_or(1000).max(0);
        Duration::from_millis(millis as u64)
    }

    pub fn frames_page_size(&self) -> u64 {
        self.get_config("FramesPageSize").unwrap_or(25).max(1) as u64
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}
