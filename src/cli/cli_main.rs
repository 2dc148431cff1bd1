// Main CLI entrypoint
// (c) 2024 Ross Younger

use std::process::ExitCode;

use super::args::CliArgs;

use crate::{
    client::client_main,
    config::{Configuration, Manager},
    server::server_main,
    util::setup_tracing,
};
use clap::Parser;
use tracing::{error, error_span, Instrument as _};

/// Main CLI entrypoint
///
/// Exit codes: 0 on success, 1 on an invalid configuration or a failed run, 2 on a command line syntax error.
pub fn cli() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();
    if args.config_files {
        for file in Manager::config_files() {
            anstream::println!("{file}");
        }
        return Ok(ExitCode::SUCCESS);
    }
    setup_tracing(args.trace_level(), args.log_file.as_deref())
        .inspect_err(|e| anstream::eprintln!("{e:?}"))?;

    let config = match args.configuration(Manager::new()) {
        Ok(c) => c,
        Err(e) => {
            error!("{e:#}");
            return Ok(ExitCode::FAILURE);
        }
    };
    if args.server {
        run_server(&args, &config)
    } else {
        run_client(&args, &config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn run_client(args: &CliArgs, config: &Configuration) -> anyhow::Result<ExitCode> {
    let job = match args.job(config) {
        Ok(j) => j,
        Err(e) => {
            error!("{e:#}");
            return Ok(ExitCode::FAILURE);
        }
    };
    client_main(config, &job, args.stats, args.profile)
        .instrument(error_span!("CLIENT"))
        .await
        .inspect_err(|e| error!("{e:#}"))
        .or_else(|_| Ok(false))
        .map(|success| {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        })
}

#[tokio::main(flavor = "current_thread")]
async fn run_server(args: &CliArgs, config: &Configuration) -> anyhow::Result<ExitCode> {
    match server_main(config, args.keylog.as_deref())
        .instrument(error_span!("SERVER"))
        .await
    {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!("{e:#}");
            Ok(ExitCode::FAILURE)
        }
    }
}
