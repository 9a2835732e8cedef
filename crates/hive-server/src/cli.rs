use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "hive-server")]
#[command(about = "Hive gateway server")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Arguments for `serve` when no subcommand is given
    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway (default)
    Serve(ServeArgs),
    /// Write the default config file
    Init {
        /// Config file path (defaults to ~/.hiveclaw/config.json)
        #[arg(long, env = "HIVE_CONFIG")]
        config: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Config file path
    #[arg(long, env = "HIVE_CONFIG")]
    pub config: Option<String>,

    /// Bind host (overrides config)
    #[arg(long, env = "HIVE_HOST")]
    pub host: Option<String>,

    /// Server port (overrides config)
    #[arg(long, env = "HIVE_PORT")]
    pub port: Option<u16>,

    /// Log level or filter directive (overrides config)
    #[arg(long, env = "HIVE_LOG")]
    pub log_level: Option<String>,

    /// Enable debug mode
    #[arg(long)]
    pub debug: bool,
}
