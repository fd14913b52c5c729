use std::path::Path;

use anyhow::{Context, Result};

use mental_poker::PokerConfig;

/// Values given on the command line that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub connect: Option<String>,
    pub deck_size: Option<usize>,
    pub players: Option<u32>,
    pub timeout_secs: Option<u64>,
}

/// Load the configuration file, or the development defaults when none is given
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<PokerConfig> {
    let mut config = match path {
        Some(path) => PokerConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => PokerConfig::development(),
    };
    apply(&mut config, overrides)?;
    config.validate()?;
    Ok(config)
}

fn apply(config: &mut PokerConfig, overrides: &Overrides) -> Result<()> {
    if let Some(connect) = &overrides.connect {
        let (host, port) = connect
            .rsplit_once(':')
            .with_context(|| format!("address '{}' is not host:port", connect))?;
        config.network.bind_address = host.to_string();
        config.network.port = port
            .parse()
            .with_context(|| format!("invalid port in '{}'", connect))?;
    }
    if let Some(deck_size) = overrides.deck_size {
        config.game.deck_size = deck_size;
    }
    if let Some(players) = overrides.players {
        config.game.players = players;
    }
    if let Some(secs) = overrides.timeout_secs {
        config.network.round_trip_timeout_secs = secs;
    }
    Ok(())
}
