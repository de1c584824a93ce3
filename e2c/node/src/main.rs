// Copyright 2022-2024 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

pub use e2c_app_options as options;
pub use e2c_app_settings as settings;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cmd;

fn init_tracing(opts: &options::Options) -> anyhow::Result<()> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(opts.log_filter()?);

    let (_metrics_counters, metrics_layer) = e2c_app::metrics::layer();

    tracing_subscriber::registry()
        .with(console_layer)
        .with(metrics_layer)
        .try_init()?;

    Ok(())
}

fn init_panic_handler() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        tracing::error!(info = %info, "panicking");
    }));
}

#[tokio::main]
async fn main() {
    let opts = options::Options::parse();

    init_tracing(&opts).expect("failed to initialize tracing");
    init_panic_handler();

    if let Err(e) = cmd::exec(&opts).await {
        tracing::error!(error = ?e, "command failed");
        std::process::exit(1);
    }
}
