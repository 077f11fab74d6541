use clap::{Args, Parser, Subcommand, ValueEnum};
use imgshift_common::StoreName;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imgshift")]
#[command(author, version, about = "Move stored images between local disk and S3")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database (overrides database.path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate images between stores
    #[command(subcommand)]
    Migrate(MigrateCommand),

    /// Delete every object in a store
    ///
    /// This does not consult the database. Only run it after a migration
    /// away from the store finished without failures.
    Clean {
        /// Store to empty
        #[arg(value_enum)]
        store: StoreArg,

        /// List what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show how many images each store holds
    Status,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum MigrateCommand {
    /// Move images from local disk to the object store
    ToObjectStore(MigrateArgs),

    /// Move images from the object store to local disk
    ToLocal(MigrateArgs),
}

impl MigrateCommand {
    pub fn destination(&self) -> StoreName {
        match self {
            Self::ToObjectStore(_) => StoreName::ObjectStore,
            Self::ToLocal(_) => StoreName::Local,
        }
    }

    pub fn args(&self) -> &MigrateArgs {
        match self {
            Self::ToObjectStore(args) | Self::ToLocal(args) => args,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct MigrateArgs {
    /// Delete source objects after their records are updated
    #[arg(long)]
    pub clean: bool,

    /// Copy objects even if the destination already has them
    #[arg(long)]
    pub force: bool,

    /// Show what would be done without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreArg {
    Local,
    ObjectStore,
}

impl From<StoreArg> for StoreName {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Local => StoreName::Local,
            StoreArg::ObjectStore => StoreName::ObjectStore,
        }
    }
}
