use anyhow::Context;
use clap::Parser;
use tracing::error;

use caption_tagger::{
    app::{Cli, ComponentRegistry, run},
    config::Config,
    observability::{self, LogFormat},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                message,
                "panic occurred"
            );
        } else {
            error!(thread = thread_name, message, "panic occurred");
        }
    }));

    observability::init(LogFormat::from_env()).context("failed to initialize tracing")?;

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let registry = ComponentRegistry::build(config).context("failed to build components")?;

    let mut stdout = std::io::stdout().lock();
    run(cli.command, &registry, &mut stdout).await
}
