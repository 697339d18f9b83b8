use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Venue policy knobs. Defaults match the house rules; overridable per
/// environment without a rebuild.
#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Seat-hold TTL during checkout.
    #[serde(default = "default_hold_minutes")]
    pub hold_minutes: i64,
    /// No cancellation or reschedule inside this window before race time.
    #[serde(default = "default_cutoff_hours")]
    pub cancellation_cutoff_hours: i64,
    /// Deposit taken up front for non-cash bookings, as a percentage.
    #[serde(default = "default_deposit_pct")]
    pub deposit_pct: i64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            hold_minutes: default_hold_minutes(),
            cancellation_cutoff_hours: default_cutoff_hours(),
            deposit_pct: default_deposit_pct(),
        }
    }
}

fn default_hold_minutes() -> i64 {
    5
}

fn default_cutoff_hours() -> i64 {
    24
}

fn default_deposit_pct() -> i64 {
    50
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overlay, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `PISTA__SERVER__PORT=8080`
            .add_source(config::Environment::with_prefix("PISTA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
