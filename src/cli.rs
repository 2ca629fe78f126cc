use clap::{Parser, Subcommand};

/// Forge: credentials, workers and realtime task updates
#[derive(Parser)]
#[command(name = "forge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to bind (overrides FORGE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Remove tombstoned workers and expired credentials once, then exit
    Purge {
        /// Purge workers tombstoned at least this many days ago
        #[arg(
            long,
            value_parser = clap::value_parser!(u32).range(..=i64::from(crate::config::MAX_RETENTION_DAYS))
        )]
        older_than_days: u32,
    },

    /// Apply database migrations and exit
    Migrate,
}
