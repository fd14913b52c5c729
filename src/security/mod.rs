//! Identity, signing, layer encryption and input validation

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PokerError;

pub mod certificate;
pub mod keys;
pub mod symmetric;
pub mod trust;

pub use certificate::{
    AuthorityValidator, CertificateAuthority, CertificateValidator, CertifiedIdentity, IdentityCard, SoftwareCard,
};
pub use keys::{PublicKey, SigningKey};
pub use symmetric::SymmetricKey;
pub use trust::TrustStore;

/// Rules applied to user-chosen strings such as nicknames
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRules {
    pub max_nick_length: usize,
    pub allowed_nick_patterns: Vec<String>,
    pub blocked_nick_patterns: Vec<String>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            max_nick_length: 32,
            allowed_nick_patterns: vec![r"^[A-Za-z0-9 _.-]+$".to_string()],
            blocked_nick_patterns: vec![r"^\s".to_string(), r"\s$".to_string()],
        }
    }
}

/// Nickname validator used at registration
#[derive(Debug)]
pub struct InputValidator {
    rules: ValidationRules,
    allowed_patterns: Vec<Regex>,
    blocked_patterns: Vec<Regex>,
}

impl InputValidator {
    pub fn new(rules: ValidationRules) -> Result<Self, PokerError> {
        let allowed_patterns: Result<Vec<_>, _> = rules
            .allowed_nick_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| PokerError::Configuration {
                    message: format!("Invalid allowed nick pattern: {}", e),
                    field: "allowed_nick_patterns".to_string(),
                })
            })
            .collect();

        let blocked_patterns: Result<Vec<_>, _> = rules
            .blocked_nick_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| PokerError::Configuration {
                    message: format!("Invalid blocked nick pattern: {}", e),
                    field: "blocked_nick_patterns".to_string(),
                })
            })
            .collect();

        Ok(Self {
            rules,
            allowed_patterns: allowed_patterns?,
            blocked_patterns: blocked_patterns?,
        })
    }

    pub fn validate_nick(&self, nick: &str) -> Result<(), PokerError> {
        if nick.is_empty() || nick.chars().count() > self.rules.max_nick_length {
            return Err(PokerError::RegistrationRejected {
                reason: format!("nickname must be 1..={} characters", self.rules.max_nick_length),
            });
        }

        if self.blocked_patterns.iter().any(|pattern| pattern.is_match(nick)) {
            return Err(PokerError::RegistrationRejected {
                reason: "nickname contains a blocked pattern".to_string(),
            });
        }

        if !self.allowed_patterns.is_empty() && !self.allowed_patterns.iter().any(|pattern| pattern.is_match(nick)) {
            return Err(PokerError::RegistrationRejected {
                reason: "nickname may only contain letters, digits, spaces, '_', '.' and '-'".to_string(),
            });
        }

        Ok(())
    }
}
