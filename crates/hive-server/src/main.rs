use clap::Parser;

mod app;
mod cli;
mod logging;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { config, force }) => {
            let path = app::init(config, force).await?;
            println!("Config written to {}", path.display());
            Ok(())
        }
        Some(Commands::Serve(args)) => app::serve(args).await,
        None => app::serve(cli.serve).await,
    }
}
