//! wasmflare CLI entry point.
//!
//! Subcommands:
//! - `setup`: create a scoped Pages credential from a bootstrap token and store it
//! - `generate`: write the Pages worker script next to the compiled module
//! - `deploy`: upload the build output as a Pages deployment
//! - `status`: show what is configured (never prints credentials)
//! - `invoke`: run one trigger through a compiled module locally

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wasmflare_api::{
    ApiClient, ArtifactSet, DeploymentUploader, SetupRequest, TargetKind, TokenScoper,
    is_pages_configured, is_worker_configured,
};
use wasmflare_common::{ConfigFile, CredentialKey, CredentialStore, FileStore, TriggerKind};
use wasmflare_core::{ModuleSource, Trigger, local_dispatcher};
use wasmflare_shim::{FileHostShim, generate_pages_script};

/// Scoped-credential setup, worker script generation and Pages deployment.
#[derive(Parser)]
#[command(name = "wasmflare", version, about, long_about = None)]
struct Cli {
    /// Configuration file (optional; defaults apply when absent).
    #[arg(long, global = true, default_value = "wasmflare.toml")]
    config: PathBuf,

    /// Credential store file (overrides `[store] path`).
    #[arg(long, global = true, env = "WASMFLARE_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a scoped Pages deployment credential and store it.
    ///
    /// The bootstrap token is used once and never stored.
    Setup {
        /// Platform account identifier.
        #[arg(long, env = "CF_ACCOUNT_ID")]
        account_id: String,

        /// Pages project name.
        #[arg(long, env = "CF_PROJECT")]
        project: String,

        /// Token allowed to create API tokens.
        #[arg(long, env = "CF_BOOTSTRAP_TOKEN", hide_env_values = true)]
        bootstrap_token: String,
    },

    /// Generate the Pages worker script into the output directory.
    Generate {
        /// The compiler's host runtime shim (e.g. wasm_exec.js).
        #[arg(long)]
        host_shim: PathBuf,
    },

    /// Upload the build output as a new deployment.
    Deploy {
        /// Deploy as a standalone worker instead of Pages.
        #[arg(long)]
        worker: bool,
    },

    /// Show stored configuration.
    Status,

    /// Dispatch one trigger to a compiled module on the local host.
    Invoke {
        /// Compiled module.
        #[arg(long)]
        module: PathBuf,

        /// Trigger kind: fetch, scheduled, queue or pages.
        #[arg(long, default_value = "fetch")]
        trigger: TriggerKind,

        /// File whose contents become the trigger payload.
        #[arg(long)]
        payload: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wasmflare=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = ConfigFile::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Setup {
            account_id,
            project,
            bootstrap_token,
        } => {
            let store = open_store(cli.store.as_deref(), &config)?;
            let request = SetupRequest::new(account_id, bootstrap_token, project);
            request.validate()?;

            let client = ApiClient::new(&config.api)?;
            TokenScoper::new(client, &config.api)
                .setup(&store, &request)
                .await
                .context("cloudflare setup")?;

            println!("Scoped Pages credential stored in {}", store.path().display());
        }

        Commands::Generate { host_shim } => {
            let path = generate_pages_script(&config.project, FileHostShim::new(host_shim))
                .context("generate worker script")?;
            println!("{}", path.display());
        }

        Commands::Deploy { worker } => {
            let store = open_store(cli.store.as_deref(), &config)?;
            let kind = if worker { TargetKind::Worker } else { TargetKind::Pages };
            let artifacts = ArtifactSet::pages(&config.project);

            let uploader = DeploymentUploader::new(ApiClient::new(&config.api)?);
            let deployment = uploader.deploy(&store, kind, &artifacts).await?;

            match deployment.url.as_deref().filter(|url| !url.is_empty()) {
                Some(url) => println!("Deployment URL: {url}"),
                None => println!("Deployment created (no URL reported)"),
            }
        }

        Commands::Status => {
            let store = open_store(cli.store.as_deref(), &config)?;
            let show = |key| -> anyhow::Result<String> {
                Ok(store.get_non_empty(key)?.unwrap_or_else(|| "-".to_string()))
            };

            println!("store:      {}", store.path().display());
            println!("account id: {}", show(CredentialKey::AccountId)?);
            println!("project:    {}", show(CredentialKey::Project)?);
            println!("pages:      {}", configured(is_pages_configured(&store)?));
            println!("worker:     {}", configured(is_worker_configured(&store)?));
        }

        Commands::Invoke {
            module,
            trigger,
            payload,
        } => {
            let payload = match payload {
                Some(path) => std::fs::read(&path)
                    .with_context(|| format!("reading payload {}", path.display()))?,
                None => Vec::new(),
            };

            let dispatcher = local_dispatcher(&config.runtime, ModuleSource::File(module))?;
            let response = dispatcher
                .dispatch(&Trigger::new(trigger, payload))
                .await
                .with_context(|| format!("dispatch {trigger}"))?;

            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&response)?;
            stdout.flush()?;
        }
    }

    Ok(())
}

/// Open the credential store: `--store`, then `[store] path`, then the
/// platform configuration directory.
fn open_store(flag: Option<&Path>, config: &ConfigFile) -> anyhow::Result<FileStore> {
    let path = match flag.map(Path::to_path_buf).or_else(|| config.store.path.clone()) {
        Some(path) => path,
        None => match FileStore::default_path() {
            Some(path) => path,
            None => bail!("no configuration directory found; pass --store"),
        },
    };

    info!(path = %path.display(), "Using credential store");
    Ok(FileStore::new(path))
}

fn configured(yes: bool) -> &'static str {
    if yes { "configured" } else { "not configured" }
}
