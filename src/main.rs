mod cli;

use imgshift::{
    clean::clean_store,
    config::{self, Config},
    migrate::{MigrateOptions, Migrator},
    records::{RecordSource, SqliteRecordSource},
    storage::{ImageStore, LocalStore, S3Store},
};
use imgshift_common::StoreName;
use imgshift_db::pool::init_pool;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, MigrateCommand};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "imgshift=debug,imgshift_db=debug,imgshift_common=debug".to_string()
        } else {
            "imgshift=info,imgshift_db=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Migrate(command) => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(migrate(&config, cli.db.as_deref(), &command))
        }
        Commands::Clean { store, dry_run } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(clean(&config, store.into(), dry_run))
        }
        Commands::Status => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            status(&config, cli.db.as_deref())
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("imgshift {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn open_records(config: &Config, db_override: Option<&Path>) -> Result<SqliteRecordSource> {
    let db_path = db_override.unwrap_or(config.database.path.as_path());
    let db_path_str = db_path.to_string_lossy();
    tracing::info!("Opening database at {}", db_path_str);
    let pool = init_pool(&db_path_str)
        .with_context(|| format!("Failed to open database {}", db_path_str))?;
    Ok(SqliteRecordSource::new(pool))
}

fn open_store(config: &Config, store: StoreName) -> Result<Arc<dyn ImageStore>> {
    match store {
        StoreName::Local => {
            let root = config.local.root();
            let local = LocalStore::new(&root)
                .with_context(|| format!("Failed to resolve images folder {:?}", root))?;
            tracing::debug!("Local store at {}", local.root().display());
            Ok(Arc::new(local))
        }
        StoreName::ObjectStore => {
            let s3 = S3Store::new(&config.object_store)?;
            tracing::debug!("Object store bucket {}", s3.bucket());
            Ok(Arc::new(s3))
        }
    }
}

/// Cancel the returned token on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight transfers");
            token.cancel();
        }
    });
    cancel
}

async fn migrate(config: &Config, db: Option<&Path>, command: &MigrateCommand) -> Result<()> {
    let destination = command.destination();
    let args = command.args();

    let records = open_records(config, db)?;
    let source_store = open_store(config, destination.other())?;
    let destination_store = open_store(config, destination)?;

    let options = MigrateOptions {
        clean_source: args.clean,
        force: args.force,
        dry_run: args.dry_run,
        ..MigrateOptions::from_config(&config.migrate)
    };

    let migrator = Migrator::new(source_store, destination_store, Arc::new(records), options);
    let report = migrator.run(cancel_on_interrupt()).await?;

    print!("{}", report);

    if report.batches_failed > 0 {
        anyhow::bail!(
            "{} records were copied but not committed; run the migration again",
            report.uncommitted
        );
    }
    if report.cancelled {
        anyhow::bail!("Migration cancelled");
    }
    Ok(())
}

async fn clean(config: &Config, store: StoreName, dry_run: bool) -> Result<()> {
    let target = open_store(config, store)?;
    let report = clean_store(target.as_ref(), dry_run, cancel_on_interrupt()).await?;

    println!("{}", report);
    Ok(())
}

fn status(config: &Config, db: Option<&Path>) -> Result<()> {
    let records = open_records(config, db)?;

    println!("Images by store:");
    for store in [StoreName::Local, StoreName::ObjectStore] {
        let count = records.count(store)?;
        println!("  {:<13} {}", store.cli_name(), count);
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("✓ Configuration is valid");
    println!("  Database: {}", config.database.path.display());
    println!("  Local images: {}", config.local.root().display());
    if config.object_store.is_configured() {
        println!(
            "  Object store: {} (bucket {}, region {})",
            config.object_store.endpoint_url(),
            config.object_store.bucket,
            config.object_store.region
        );
        match config.object_store.ensure_complete() {
            Ok(()) => println!("  Object store credentials: set"),
            Err(e) => println!("  ✗ {}", e),
        }
    } else {
        println!("  Object store: not configured");
    }
    println!(
        "  Migration: page {} / batch {} / concurrency {}",
        config.migrate.page_size, config.migrate.batch_size, config.migrate.concurrency
    );

    Ok(())
}
