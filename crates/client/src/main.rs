// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use pixgram::command::{self, CliArgs};
use pixgram::config::ClientConfig;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    if let Err(e) = args.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&args.config);

    std::process::exit(command::run(args).await);
}

fn init_tracing(config: &ClientConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}
