//! Point d'entrée CLI pour df-onibus

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use df_onibus::cli::{self, Commands};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

/// Carte temps réel des ônibus du DF (geoserver SEMOB)
#[derive(Parser)]
#[command(name = "df-onibus")]
#[command(author, version)]
#[command(about = "Synchroniser les données SEMOB-DF (ônibus, paradas, linhas) avec une carte embarquée")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // stdout porte le protocole du pont : logs sur stderr
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Serve { config } => {
            cli::cmd_serve(config.resolve()?).await?;
        }
        Commands::Snapshot {
            output,
            bbox,
            config,
        } => {
            cli::cmd_snapshot(config.resolve()?, &output, bbox.as_deref()).await?;
        }
        Commands::Route { code, config } => {
            cli::cmd_route(config.resolve()?, &code).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
