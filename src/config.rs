//! Configuration management for the mental poker roles

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PokerError;

/// Largest deck the protocol accepts
pub const MAX_DECK_SIZE: usize = 100;

/// Main configuration shared by the Playing Area, the Caller and the Players
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PokerConfig {
    pub network: NetworkConfig,
    pub game: GameConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Network-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Address the Playing Area binds to and the clients dial
    pub bind_address: String,
    pub port: u16,
    /// Frames announcing a larger body are rejected
    pub max_frame_bytes: usize,
    /// Deadline for one Playing Area round trip with a Player (0 disables deadlines)
    pub round_trip_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5000,
            max_frame_bytes: 4 * 1024 * 1024,
            round_trip_timeout_secs: 30,
        }
    }
}

impl NetworkConfig {
    /// `host:port` string for binding or dialing
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn round_trip_timeout(&self) -> Option<Duration> {
        match self.round_trip_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Game-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Number of cards in the deck (N)
    pub deck_size: usize,
    /// Player quota announced by the Caller
    pub players: u32,
    /// Upper bound for any quota the Playing Area accepts
    pub max_players: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            deck_size: 60,
            players: 4,
            max_players: 6,
        }
    }
}

/// Audit log persistence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// When set, every audit entry is appended to this file as a JSON line
    pub log_path: Option<PathBuf>,
}

/// Strong-identity registration policy enforced by the Playing Area
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Refuse registrations that do not carry a certificate
    pub require_certificate: bool,
    /// Accepted certificate serial numbers; empty accepts any valid certificate
    #[serde(default)]
    pub allow_list: Vec<u64>,
    /// Hex encoded key of the authority that issues certificates
    pub authority_public_key: Option<String>,
}

impl PokerConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PokerError> {
        let content = fs::read_to_string(path).map_err(|e| PokerError::Configuration {
            message: format!("Failed to read config file: {}", e),
            field: "config_file".to_string(),
        })?;

        let config: PokerConfig = toml::from_str(&content).map_err(|e| PokerError::Configuration {
            message: format!("Failed to parse config file: {}", e),
            field: "config_format".to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), PokerError> {
        let content = toml::to_string_pretty(self).map_err(|e| PokerError::Configuration {
            message: format!("Failed to serialize config: {}", e),
            field: "config_serialization".to_string(),
        })?;

        fs::write(path, content).map_err(|e| PokerError::Configuration {
            message: format!("Failed to write config file: {}", e),
            field: "config_write".to_string(),
        })?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), PokerError> {
        if self.network.max_frame_bytes < 1024 {
            return Err(PokerError::Configuration {
                message: "Max frame size must be at least 1024 bytes".to_string(),
                field: "network.max_frame_bytes".to_string(),
            });
        }

        validate_deck_size(self.game.deck_size)?;

        if self.game.max_players == 0 {
            return Err(PokerError::Configuration {
                message: "Max players must be greater than 0".to_string(),
                field: "game.max_players".to_string(),
            });
        }

        if self.game.players == 0 || self.game.players > self.game.max_players {
            return Err(PokerError::Configuration {
                message: format!("Player quota must lie within 1..={}", self.game.max_players),
                field: "game.players".to_string(),
            });
        }

        if let Some(key) = &self.identity.authority_public_key {
            crate::security::PublicKey::from_hex(key).map_err(|_| PokerError::Configuration {
                message: "Authority public key is not a valid key".to_string(),
                field: "identity.authority_public_key".to_string(),
            })?;
        }

        if self.identity.require_certificate && self.identity.authority_public_key.is_none() {
            return Err(PokerError::Configuration {
                message: "Certificates are required but no authority key is configured".to_string(),
                field: "identity.authority_public_key".to_string(),
            });
        }

        Ok(())
    }

    /// Create a production-ready configuration
    pub fn production() -> Self {
        Self {
            network: NetworkConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 5000,
                max_frame_bytes: 1024 * 1024,
                round_trip_timeout_secs: 60,
            },
            game: GameConfig::default(),
            audit: AuditConfig {
                log_path: Some(PathBuf::from("mental-poker-audit.jsonl")),
            },
            identity: IdentityConfig::default(),
        }
    }

    /// Create a development configuration with relaxed settings
    pub fn development() -> Self {
        Self {
            network: NetworkConfig {
                round_trip_timeout_secs: 5,
                ..Default::default()
            },
            game: GameConfig {
                deck_size: 8,
                players: 2,
                max_players: 6,
            },
            audit: AuditConfig::default(),
            identity: IdentityConfig::default(),
        }
    }
}

/// A deck must hold 4..=100 cards and divide evenly into quarters
pub fn validate_deck_size(deck_size: usize) -> Result<(), PokerError> {
    if deck_size < 4 || deck_size > MAX_DECK_SIZE || deck_size % 4 != 0 {
        return Err(PokerError::Configuration {
            message: format!(
                "Deck size must be a multiple of 4 within 4..={}, got {}",
                MAX_DECK_SIZE, deck_size
            ),
            field: "game.deck_size".to_string(),
        });
    }
    Ok(())
}
