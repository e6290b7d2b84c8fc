//! JSON configuration for the failed-join threshold and per-cause ticket TTLs

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tunable timings, all in seconds. A TTL of zero disables bypass tickets for
/// that disconnect cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Sessions shorter than this count as failed joins.
    pub failed_join_threshold_seconds: f64,
    /// Ticket lifetime after a normal quit.
    pub quit_ticket_ttl_seconds: f64,
    /// Ticket lifetime after a client crash.
    pub crash_ticket_ttl_seconds: f64,
    /// Ticket lifetime after a probable timeout.
    pub timeout_ticket_ttl_seconds: f64,
    /// Minimum ticket lifetime after a failed join. Should be long enough for
    /// the client to download missing assets and rejoin.
    pub failed_join_ticket_ttl_seconds: f64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            failed_join_threshold_seconds: 3.0,
            quit_ticket_ttl_seconds: 15.0,
            crash_ticket_ttl_seconds: 30.0,
            timeout_ticket_ttl_seconds: 30.0,
            failed_join_ticket_ttl_seconds: 90.0,
        }
    }
}

impl Timings {
    pub fn failed_join_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.failed_join_threshold_seconds)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub timings: Timings,
}

impl Config {
    /// Loads the config file, writing the defaults back when it is missing so
    /// operators have a file to edit.
    pub fn load(path: &Path) -> Result<Config, Box<dyn Error>> {
        if !path.exists() {
            let config = Config::default();
            config.save(path)?;
            return Ok(config);
        }
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Rejects bad timings up front; the admission core never re-checks them.
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        let timings = &self.timings;
        let fields = [
            (
                "failed_join_threshold_seconds",
                timings.failed_join_threshold_seconds,
            ),
            ("quit_ticket_ttl_seconds", timings.quit_ticket_ttl_seconds),
            ("crash_ticket_ttl_seconds", timings.crash_ticket_ttl_seconds),
            (
                "timeout_ticket_ttl_seconds",
                timings.timeout_ticket_ttl_seconds,
            ),
            (
                "failed_join_ticket_ttl_seconds",
                timings.failed_join_ticket_ttl_seconds,
            ),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{} must be a non-negative number, got {}", name, value).into());
            }
        }
        Ok(())
    }
}
