// SPDX-License-Identifier: GPL-2.0-or-later

mod app;

use app::run;

use std::{path::PathBuf, process::ExitCode};

#[tokio::main]
async fn main() -> ExitCode {
    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-V", "--version"]) {
        print!("{}", env!("CARGO_PKG_VERSION").to_owned());
        return ExitCode::SUCCESS;
    }

    let Ok(subcommand) = pargs.subcommand() else {
        println!("invalid args");
        return ExitCode::FAILURE;
    };
    let Some(subcommand) = subcommand else {
        print!("{HELP}");
        return ExitCode::FAILURE;
    };
    match subcommand.as_str() {
        "run" => {
            if pargs.contains(["-h", "--help"]) {
                print!("{HELP_RUN}");
                return ExitCode::SUCCESS;
            }
            let config = pargs
                .value_from_str("--config")
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
            if let Err(e) = run(&config).await {
                eprintln!("failed to run app: {e}");
                return ExitCode::FAILURE;
            };
        }
        v => {
            println!("invalid subcommand '{v}'");
            return ExitCode::FAILURE;
        }
    }
    ExitCode::SUCCESS
}

const DEFAULT_CONFIG_PATH: &str = "./configs/roictl.toml";

const HELP: &str = "\
Usage: roictl [OPTIONS] <COMMAND>

Commands:
  run   Run the program
  help  Print this message or the help of the given subcommand(s)

Options:
      --config <CONFIG>  [default: ./configs/roictl.toml]
  -h, --help             Print help
  -V, --version          Print version
";

const HELP_RUN: &str = "\
Run the program

Usage: roictl run [OPTIONS]

Options:
      --config <CONFIG>  [default: ./configs/roictl.toml]
  -h, --help             Print help
";
