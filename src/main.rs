use dotenvy::dotenv;
use tracing::{error, info};

mod cli;
mod config;
mod llm;
mod storyboard;
mod utils;

use cli::{parse_cli_args, run};
use utils::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let _guards = init_logging();

    let args: Vec<String> = std::env::args().collect();
    let command = parse_cli_args(&args)?;
    info!("Starting storyboard command: {:?}", command);

    if let Err(err) = run(command).await {
        error!("storyboard command failed: {err:#}");
        return Err(err);
    }
    Ok(())
}
