use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::fs;

use mental_poker::SigningKey;

/// On-disk form of a participant key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyFile {
    /// Secret key, hex encoded
    pub secret: String,
    /// Public key, kept alongside the secret for verification on load
    pub public_key: String,
    /// Unix timestamp of creation
    pub created_at: i64,
    pub version: u32,
}

/// Load the key stored at `path`, creating and saving a fresh one if the file does not exist
pub async fn load_or_create(path: &Path) -> Result<SigningKey> {
    if fs::try_exists(path).await? {
        return load(path).await;
    }

    let (key, secret) = generate();
    let file = KeyFile {
        secret: hex::encode(secret),
        public_key: key.public_key().to_hex(),
        created_at: chrono::Utc::now().timestamp(),
        version: 1,
    };
    let json = serde_json::to_string_pretty(&file)?;
    fs::write(path, json)
        .await
        .with_context(|| format!("writing key file {}", path.display()))?;
    tracing::info!(path = %path.display(), key = %key.public_key(), "Created signing key");
    Ok(key)
}

async fn load(path: &Path) -> Result<SigningKey> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading key file {}", path.display()))?;
    let file: KeyFile = serde_json::from_str(&content).context("parsing key file")?;
    let secret = hex::decode(&file.secret).context("decoding secret key")?;
    let key = SigningKey::from_secret_bytes(&secret)?;

    if key.public_key().to_hex() != file.public_key {
        bail!("key file {} is corrupt: public key does not match the secret", path.display());
    }
    Ok(key)
}

fn generate() -> (SigningKey, [u8; 32]) {
    let mut rng = rand::thread_rng();
    loop {
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        if let Ok(key) = SigningKey::from_secret_bytes(&secret) {
            return (key, secret);
        }
    }
}
