use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use signin_service::prelude::*;

/// signin-server - OAuth sign-in with one user record per email
#[derive(Parser)]
#[command(name = "signin-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of searching the standard locations
    #[arg(short, long, env = "SIGNIN_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override service.port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Print the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::load_for_service("signin-server").context("loading configuration")?,
    };

    if let Some(port) = cli.port {
        config.service.port = port;
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&masked(config))?);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    init_tracing(&config)?;

    let store = connect_store(&config)
        .await
        .context("opening user store")?;
    let state = AppState::new(config.clone(), store).context("building application state")?;

    tracing::info!(providers = ?state.providers().enabled(), "Sign-in providers ready");

    Server::new(config).serve(router(state)).await?;
    Ok(())
}

fn masked(mut config: Config) -> Config {
    const MASK: &str = "***";

    for provider in [&mut config.oauth.github, &mut config.oauth.google]
        .into_iter()
        .flatten()
    {
        provider.client_secret = MASK.to_string();
    }

    if let Some(surreal) = config.store.surrealdb.as_mut() {
        if surreal.password.is_some() {
            surreal.password = Some(MASK.to_string());
        }
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_hides_secrets() {
        let mut config = Config::default();
        config.oauth.github = Some(OAuthProviderConfig::new("gh-id", "gh-secret"));

        let masked = masked(config);
        let github = masked.oauth.github.unwrap();
        assert_eq!(github.client_id, "gh-id");
        assert_eq!(github.client_secret, "***");
    }

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::parse_from(["signin-server", "--port", "9000"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.port, Some(9000));

        let cli = Cli::parse_from(["signin-server", "config"]);
        assert!(matches!(cli.command, Some(Commands::Config)));
    }
}
