use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use mental_poker::client::{spawn_stdin_console, ConsoleCommand};
use mental_poker::observability::AuditLog;
use mental_poker::{
    run_session, Behavior, Caller, Participant, Player, PlayingAreaServer, PokerConfig, SessionOutcome, SigningKey,
};
use tokio::sync::mpsc::UnboundedReceiver;

mod config;
mod keys;

use config::Overrides;

#[derive(Parser)]
#[command(name = "mental-poker")]
#[command(about = "Play mental poker without a trusted dealer")]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Playing Area address as host:port
    #[arg(long, global = true)]
    connect: Option<String>,

    /// Per-player round trip deadline in seconds, 0 disables deadlines
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Playing Area relay
    PlayingArea,

    /// Register as the Caller and run one game
    Caller {
        #[arg(short, long, default_value = "caller")]
        nick: String,

        /// Number of cards in the deck
        #[arg(short, long)]
        deck_size: Option<usize>,

        /// Players to wait for before the game starts
        #[arg(short, long)]
        players: Option<u32>,

        /// Signing key file, created on first use
        #[arg(short, long)]
        key_file: Option<PathBuf>,

        /// Do not read menu commands from stdin
        #[arg(long)]
        no_console: bool,
    },

    /// Register as a Player
    Player {
        #[arg(short, long)]
        nick: String,

        /// honest, short-card, tamper-deck, false-winner or random:PERCENT
        #[arg(short, long, default_value = "honest")]
        behavior: String,

        /// Commit this card instead of drawing one
        #[arg(long, value_delimiter = ',')]
        card: Option<Vec<u64>>,

        /// Signing key file, created on first use
        #[arg(short, long)]
        key_file: Option<PathBuf>,

        #[arg(long)]
        no_console: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    mental_poker::observability::init_from_env().map_err(|e| anyhow!("failed to initialise logging: {}", e))?;

    let cli = Cli::parse();
    let mut overrides = Overrides {
        connect: cli.connect.clone(),
        timeout_secs: cli.timeout,
        ..Default::default()
    };
    if let Command::Caller { deck_size, players, .. } = &cli.command {
        overrides.deck_size = *deck_size;
        overrides.players = *players;
    }
    let config = config::load(cli.config.as_deref(), &overrides)?;

    match cli.command {
        Command::PlayingArea => run_playing_area(&config).await,
        Command::Caller {
            nick,
            key_file,
            no_console,
            ..
        } => {
            let key = signing_key(key_file).await?;
            let caller = Caller::new(&nick, key, config.game.deck_size, config.game.players)?
                .with_audit_log(audit_log(&config));
            play(caller, &config, no_console).await
        }
        Command::Player {
            nick,
            behavior,
            card,
            key_file,
            no_console,
        } => {
            let behavior: Behavior = behavior.parse()?;
            let key = signing_key(key_file).await?;
            let mut player = Player::new(&nick, key)
                .with_behavior(behavior)
                .with_audit_log(audit_log(&config));
            if let Some(card) = card {
                player = player.with_fixed_card(card);
            }
            play(player, &config, no_console).await
        }
    }
}

async fn run_playing_area(config: &PokerConfig) -> Result<()> {
    let server = PlayingAreaServer::bind(config).await?;
    println!("Playing area listening on {}", server.local_addr()?);
    println!("Public key: {}", server.public_key());

    let winners = server.run().await?;
    let winners: Vec<String> = winners.iter().map(|id| id.to_string()).collect();
    println!("Game over, winners: {}", winners.join(", "));
    Ok(())
}

async fn play<P: Participant>(mut participant: P, config: &PokerConfig, no_console: bool) -> Result<()> {
    let console: Option<UnboundedReceiver<ConsoleCommand>> = (!no_console).then(spawn_stdin_console);
    let address = config.network.address();
    info!(role = ?participant.role(), nick = participant.nick(), address = %address, "Joining playing area");

    let outcome = run_session(&mut participant, &address, config.network.max_frame_bytes, console).await?;
    match outcome {
        SessionOutcome::Finished { winners } => {
            let winners: Vec<String> = winners.iter().map(|id| id.to_string()).collect();
            println!("Game over, winners: {}", winners.join(", "));
        }
        SessionOutcome::Disqualified => println!("You were disqualified"),
        SessionOutcome::Aborted { reason } => println!("Game aborted: {}", reason),
    }
    Ok(())
}

async fn signing_key(path: Option<PathBuf>) -> Result<SigningKey> {
    match path {
        Some(path) => keys::load_or_create(&path).await,
        None => Ok(SigningKey::generate()),
    }
}

fn audit_log(config: &PokerConfig) -> AuditLog {
    match &config.audit.log_path {
        Some(path) => AuditLog::with_file(path),
        None => AuditLog::new(),
    }
}
