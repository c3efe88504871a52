use anyhow::{bail, Context, Result};
use env_logger::Env;
use geode_resources::cli::{CliArgs, Command};
use geode_resources::config::BrowserConfig;
use geode_resources::database::{CollectionScope, ResourceDatabase};
use geode_resources::watch::SourceWatcher;
use std::time::Duration;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = match CliArgs::parse_from_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("[cli] {err}");
            std::process::exit(2);
        }
    };
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Runtime error: {err:?}");
            std::process::exit(1);
        }
    };
    if let Err(err) = runtime.block_on(run(args)) {
        eprintln!("Application error: {err:?}");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let mut config = BrowserConfig::load_or_default(&args.config);
    let overrides = args.config_overrides();
    if !overrides.is_empty() {
        log::info!("[cli] overriding {}", overrides.applied_fields().join(", "));
        config.apply_overrides(&overrides);
    }
    let mut database = ResourceDatabase::from_config(&config)?;
    database.reload_all().await;
    let scope = CollectionScope::from(args.source.clone());

    match &args.command {
        Command::List(filter) => {
            for resource in database.resources(&scope, *filter) {
                let marker = if resource.is_favorite() { "*" } else { " " };
                println!("{marker} {:<12} {:<40} {}", resource.kind().label(), resource.display_name(), resource.id());
            }
        }
        Command::Find(name) => match database.find(name, args.source.as_ref()) {
            Some(resource) => {
                println!("{} ({}) from {}", resource.display_name(), resource.kind().label(), resource.source());
                println!("  id: {}", resource.id());
                if let Some(path) = resource.path() {
                    println!("  path: {}", path.display());
                }
                if !resource.frames().is_empty() {
                    println!("  frames: {}", resource.frames().len());
                }
            }
            None => bail!("resource '{name}' not found"),
        },
        Command::Stats => {
            let stats = database.stats(&scope);
            println!("{}", serde_json::to_string_pretty(&stats).context("Failed to serialize stats")?);
        }
        Command::Preview { name, output } => {
            let resource =
                database.find(name, args.source.as_ref()).with_context(|| format!("resource '{name}' not found"))?;
            let preview = database.fetch_preview(&resource).await?;
            match preview.encode_png() {
                Some(bytes) => {
                    std::fs::write(output, bytes?)
                        .with_context(|| format!("Failed to write preview {}", output.display()))?;
                    println!("wrote {}", output.display());
                }
                None => println!("'{name}' has no image preview"),
            }
        }
        Command::Watch => watch(&mut database).await?,
    }

    if let Some(path) = &config.favorites_path {
        database.favorites_snapshot().save(path)?;
    }
    database.dispose();
    Ok(())
}

async fn watch(database: &mut ResourceDatabase) -> Result<()> {
    let mut watcher = SourceWatcher::new()?;
    watcher.sync(database.sources())?;
    log::info!("[watch] watching {} sources", watcher.watched_sources().len());
    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        for source in watcher.drain_changed() {
            match database.reload_source(&source).await {
                Ok(stats) => log::info!("[watch] reloaded {source}: {} resources", stats.total),
                Err(err) => log::warn!("[watch] reload of {source} failed: {err}"),
            }
        }
    }
}
