use anyhow::Result;
use clap::{CommandFactory, Parser};
use smlbridge_cli::{logging, run, Args, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let settings = match Settings::resolve(&args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}\n", Args::command().render_usage());
            return Err(e.into());
        }
    };

    tracing::info!(
        "sml2mqtt {}: bridging {} to {} ({} values)",
        smlbridge_core::VERSION,
        settings.input.display(),
        settings.mqtt.broker_addr(),
        settings.spec.len()
    );

    let summary = run(&settings).await?;
    tracing::info!(
        "Done: {} records, {} published, {} acknowledged",
        summary.records,
        summary.published,
        summary.acknowledged
    );
    Ok(())
}
