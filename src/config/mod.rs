//! Configuration module - environment variable parsing and simulation tuning

pub mod sim;

pub use sim::{
    CapacityConfig, ObjectShape, PhysicsConfig, SimConfig, SphereSpec, TerrainConfig,
    TerrainMode, TurretConfig, VehicleConfig, WeaponConfig, WeaponsConfig, WheelConfig,
};

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Process configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Optional JSON file overriding simulation defaults
    pub sim_config_path: Option<PathBuf>,
    /// Fixed terrain seed; a random one is drawn when absent
    pub terrain_seed: Option<u64>,
    /// Allowed client origins for CORS (comma separated); permissive when absent
    pub client_origin: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let terrain_seed = match env::var("TERRAIN_SEED") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::Invalid("TERRAIN_SEED must be a u64".to_string()))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            sim_config_path: env::var("SIM_CONFIG").ok().map(PathBuf::from),
            terrain_seed,
            client_origin: env::var("CLIENT_ORIGIN").ok(),
        })
    }

    /// Load the simulation config from `sim_config_path`, or defaults
    pub fn load_sim_config(&self) -> Result<SimConfig, ConfigError> {
        let config = match &self.sim_config_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
                SimConfig::from_json(&raw)?
            }
            None => SimConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Failed to read simulation config {0}: {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Invalid simulation config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
