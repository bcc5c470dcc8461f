use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = quant_relay_cli::Cli::parse();
    quant_relay_cli::app_init()?;
    quant_relay_cli::run(cli.command).await
}
