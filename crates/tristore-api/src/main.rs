//! tristore server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! relational, graph and document stores, and serves the HTTP API.
//!
//! Every key can be overridden from the environment with a `TRISTORE_`
//! prefix, e.g. `TRISTORE_PORT=8080`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tristore_api::{AppState, ServerConfig};

#[derive(Parser)]
#[command(author, version, about = "tristore knowledge-graph server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TRISTORE"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let relational_path = expand_tilde(&server_cfg.relational_path);
  let graph_path = expand_tilde(&server_cfg.graph_path);
  let document_path = expand_tilde(&server_cfg.document_path);

  let stores = tristore_store_sqlite::open(&relational_path, &graph_path, &document_path)
    .await
    .with_context(|| {
      format!("failed to open stores at {relational_path:?}, {graph_path:?}, {document_path:?}")
    })?;

  let state = AppState::new(stores, server_cfg.read_timeout());
  let app = tristore_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
