mod browser;
mod client;
mod config;
mod credentials;
mod error;
mod server;
mod session;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use browser::ChromeAuthenticator;
use client::MintedClient;
use config::Config;
use credentials::{CredentialResolver, KeyringStore, TerminalPrompter};
use server::MintedMcp;
use session::SessionCache;

/// MCP server for a Minted account: contacts, orders, latest delivery.
#[derive(Parser, Debug)]
#[command(name = "minted-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Never ask for credentials on the terminal.
    #[arg(long, env = "MINTED_NO_PROMPT")]
    no_prompt: bool,

    /// Skip the OS keyring lookup.
    #[arg(long, env = "MINTED_NO_KEYRING")]
    no_keyring: bool,

    /// Show the Chrome window during login (non-headless mode).
    #[arg(long, env = "MINTED_VISIBLE")]
    visible: bool,

    /// Chrome/Chromium executable; detected automatically when omitted.
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Seconds to wait for the login page to redirect.
    #[arg(long, env = "MINTED_LOGIN_TIMEOUT_SECS", default_value_t = 30)]
    login_timeout_secs: u64,

    /// Seconds before a Minted API request is abandoned.
    #[arg(long, env = "MINTED_REQUEST_TIMEOUT_SECS", default_value_t = 300)]
    request_timeout_secs: u64,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            headless: !self.visible,
            chrome_executable: self.chrome_path,
            login_timeout: Duration::from_secs(self.login_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            prompt_enabled: !self.no_prompt,
            keyring_enabled: !self.no_keyring,
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    // stdout carries the MCP protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting minted-mcp v{}", env!("CARGO_PKG_VERSION"));
    let config = args.into_config();

    let mut resolver = CredentialResolver::from_env();
    if config.keyring_enabled {
        resolver = resolver.with_secret_store(KeyringStore::default());
    }
    if config.prompt_enabled {
        resolver = resolver.with_prompter(TerminalPrompter);
    }

    // Login is deferred to the first tool call
    let authenticator = Arc::new(ChromeAuthenticator::from_config(&config));
    let sessions = Arc::new(SessionCache::new(resolver, authenticator));
    let client = MintedClient::new(&config, sessions)
        .context("Invalid Minted endpoint configuration")?;
    let handler = MintedMcp { client: Arc::new(client) };

    let service = rmcp::serve_server(handler, rmcp::transport::stdio())
        .await
        .context("Failed to start MCP server")?;

    // Wait for the client to disconnect (EOF on stdin)
    service.waiting().await?;

    tracing::info!("Server exited cleanly");
    Ok(())
}
