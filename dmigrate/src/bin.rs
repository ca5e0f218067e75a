use std::process::ExitCode;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::Parser;
use dmig::loc::user;
use dmigrate::{
    drive::{gdrive::GoogleDrive, id::IdBuf, Drive},
    oauth2::{self, StaticToken, TokenCache},
    Options,
};

const ACCESS_TOKEN_VAR: &str = "DMIG_ACCESS_TOKEN";

#[derive(Parser)]
#[command(name = "dmigrate")]
#[command(author, version, about = "Migrate a Drive folder hierarchy into a shared drive", long_about = None)]
struct Cli {
    /// Configuration file [default: per-user config file, if it exists]
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Compare source and destination, report what would be done and stop
    #[arg(long)]
    dry_run: bool,

    /// Migrate despite multi-parent entries, leaving them out
    #[arg(long)]
    ignore_multi_parent: bool,

    /// Report the multi-parent entries of the source and stop
    #[arg(long, conflicts_with_all = ["dry_run", "ignore_multi_parent"])]
    list_multi_parent: bool,

    /// Identifier of the folder to migrate
    source: String,

    /// Identifier of the shared drive, or shared drive folder, to migrate into
    destination: String,
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Can't start the async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            if let Some(err) = err.downcast_ref::<dmig::Error>() {
                if err.is_remote() {
                    log::error!("Nothing is lost. Running again resumes the migration.");
                }
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(unix)]
fn init_logging() {
    use systemd_journal_logger::{connected_to_journal, JournalLog};

    if connected_to_journal() {
        let installed = JournalLog::new().and_then(|journal| {
            journal
                .add_extra_field("VERSION", env!("CARGO_PKG_VERSION"))
                .install()
                .map_err(std::io::Error::other)
        });
        if installed.is_ok() {
            log::set_max_level(log::LevelFilter::Info);
            return;
        }
    }
    init_env_logger();
}

#[cfg(not(unix))]
fn init_logging() {
    init_env_logger();
}

fn init_env_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref()).await?;
    log::trace!("Loaded config: {config:?}");

    let opts = Options {
        source: IdBuf::from(cli.source),
        destination: IdBuf::from(cli.destination),
        dry_run: cli.dry_run,
        ignore_multi_parent: cli.ignore_multi_parent,
        list_multi_parent: cli.list_multi_parent,
    };

    let client = reqwest::Client::builder().build()?;

    match std::env::var(ACCESS_TOKEN_VAR) {
        Ok(token) if !token.is_empty() => {
            log::info!("Using access token from {ACCESS_TOKEN_VAR}");
            let drive = GoogleDrive::new(StaticToken::new(token), client).await?;
            migrate(&drive, &config, &opts).await
        }
        _ => {
            let secret_path = match &config.client_secret {
                Some(path) => path.clone(),
                None => user::oauth_secret_file()?,
            };
            let secret = dmig::oauth2::load_google_secret(&secret_path).await?;
            log::info!("Authenticating with client-id {}", secret.client_id.as_str());

            let cache_path = match &config.token_cache {
                Some(path) => path.clone(),
                None => user::token_cache_file()?,
            };
            let cache = TokenCache::load(cache_path).await?;
            let auth = oauth2::Client::new(secret, cache, Some(client.clone()));
            let drive = GoogleDrive::new(auth, client).await?;
            migrate(&drive, &config, &opts).await
        }
    }
}

async fn load_config(path: Option<&camino::Utf8Path>) -> anyhow::Result<dmig::Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("No such config file: {path}");
            }
            log::info!("Found config file: {path}");
            dmig::Config::load_from_file(path).await
        }
        None => {
            let path = user::config_file()?;
            if path.exists() {
                log::info!("Found config file: {path}");
                dmig::Config::load_from_file(&path).await
            } else {
                log::info!("No config file at {path}, using defaults");
                Ok(dmig::Config::default())
            }
        }
    }
}

async fn migrate<D: Drive>(
    drive: &D,
    config: &dmig::Config,
    opts: &Options,
) -> anyhow::Result<()> {
    let summary = dmigrate::run(drive, config, opts)
        .await
        .with_context(|| format!("Migration of {} failed", opts.source))?;

    log::info!(
        "source: {} folder(s), {} file(s), {} multi-parent entries",
        summary.source.folders,
        summary.source.files,
        summary.multi_parent
    );
    if let Some(dest) = summary.destination {
        log::info!(
            "destination before migration: {} folder(s), {} file(s)",
            dest.folders,
            dest.files
        );
    }
    if let Some(plan) = summary.plan {
        log::info!("plan: {plan}");
    }
    if let Some(migrated) = summary.migrated {
        log::info!("done: {migrated}");
    }
    Ok(())
}
