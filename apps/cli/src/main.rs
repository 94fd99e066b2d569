//! multiUploader command-line entry point.

mod cli;
mod console;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use multiuploader_logging::LogOptions;
use multiuploader_providers::{ProviderRegistry, default_registry};
use multiuploader_session::{NoWindow, NotificationGate, UploadController, UploadOutcome};
use multiuploader_settings::{Settings, SettingsStore, settings_path};
use multiuploader_transport::Transports;

use cli::{Cli, Commands, ConfigureArgs, UploadArgs};
use console::{ConsoleNotifier, ConsoleObserver};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = multiuploader_logging::init(LogOptions {
        stderr_level: cli.stderr_level(),
        ..LogOptions::default()
    }) {
        eprintln!("warning: logging disabled: {e}");
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting multiuploader");

    let settings_file = cli.settings.clone().unwrap_or_else(settings_path);
    let settings_file = settings_file.as_path();

    match &cli.command {
        Commands::Upload(args) => upload(&cli, settings_file, args).await,
        Commands::Providers => list_providers(&cli, settings_file),
        Commands::Configure(args) => configure(&cli, settings_file, args),
        Commands::Logs => {
            println!("{}", multiuploader_logging::log_dir().display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    Settings::load(path).with_context(|| format!("failed to load {}", path.display()))
}

fn build_registry(cli: &Cli) -> anyhow::Result<ProviderRegistry> {
    let transports = Transports::new().context("failed to build HTTP clients")?;
    let mut registry = default_registry(transports);
    if cli.mock_providers {
        registry.register_mocks();
    }
    Ok(registry)
}

fn ensure_known(registry: &ProviderRegistry, name: &str) -> anyhow::Result<()> {
    if !registry.contains(name) {
        bail!(
            "unknown provider {name:?}; available: {}",
            registry.names().join(", ")
        );
    }
    Ok(())
}

async fn upload(
    cli: &Cli,
    settings_file: &Path,
    args: &UploadArgs,
) -> anyhow::Result<ExitCode> {
    let settings = load_settings(settings_file)?;
    let registry = build_registry(cli)?;
    let name = args.provider.as_str();
    ensure_known(&registry, name)?;

    if !settings.is_provider_enabled(name) {
        bail!("{name} is disabled; run `multiuploader configure {name:?} --enable`");
    }

    let provider = registry.provider(name, &settings)?;
    if provider.requires_auth() {
        provider
            .validate_key(&settings.provider_api_key(name))
            .with_context(|| format!("{name} is not configured"))?;
    }

    let (observer, mut done) = ConsoleObserver::new();
    let gate = NotificationGate::new(
        Arc::new(ConsoleNotifier),
        Arc::new(settings),
        Arc::new(NoWindow),
    );
    let controller = UploadController::new(Arc::new(observer), gate);
    controller.start_file(provider, &args.file).await?;

    let finished = tokio::select! {
        outcome = &mut done => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    let outcome = match finished {
        Some(outcome) => outcome,
        None => {
            eprintln!("\ncancelling...");
            controller.cancel();
            done.await
        }
    }
    .context("upload ended without a result")?;

    match outcome {
        UploadOutcome::Completed(result) => {
            println!("Upload Complete!");
            for (label, link) in result.links() {
                println!("{label}: {link}");
            }
            if let Some(message) = &result.message {
                println!("{message}");
            }
            Ok(ExitCode::SUCCESS)
        }
        UploadOutcome::Failed(friendly) => {
            eprintln!("{}", friendly.format());
            Ok(ExitCode::FAILURE)
        }
        UploadOutcome::Cancelled(friendly) => {
            eprintln!("{}", friendly.format());
            Ok(ExitCode::from(130))
        }
    }
}

fn list_providers(cli: &Cli, settings_file: &Path) -> anyhow::Result<ExitCode> {
    let settings = load_settings(settings_file)?;
    let registry = build_registry(cli)?;

    for name in registry.names() {
        let provider = registry.provider(name, &settings)?;
        let enabled = if settings.is_provider_enabled(name) {
            "enabled"
        } else {
            "disabled"
        };
        let key = if !provider.requires_auth() {
            "no key needed"
        } else if provider
            .validate_key(&settings.provider_api_key(name))
            .is_ok()
        {
            "key set"
        } else {
            "no key"
        };
        println!("{name:<24} {enabled:<9} {key}");
    }
    Ok(ExitCode::SUCCESS)
}

fn configure(
    cli: &Cli,
    settings_file: &Path,
    args: &ConfigureArgs,
) -> anyhow::Result<ExitCode> {
    let mut settings = load_settings(settings_file)?;
    let registry = build_registry(cli)?;
    let name = args.provider.as_str();
    ensure_known(&registry, name)?;

    let mut entry = settings.provider(name);
    if let Some(key) = &args.api_key {
        registry.provider(name, &settings)?.validate_key(key)?;
        entry.api_key = key.clone();
    }
    if args.enable {
        entry.enabled = true;
    }
    if args.disable {
        entry.enabled = false;
    }

    settings.set_provider(name, entry);
    settings
        .save(settings_file)
        .with_context(|| format!("failed to save {}", settings_file.display()))?;

    println!("{name} saved to {}", settings_file.display());
    Ok(ExitCode::SUCCESS)
}
