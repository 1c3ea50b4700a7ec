//! tlc-cli entry point.
//!
//! ## CLI Subcommands
//!
//! - `tlc-cli run` - Start an executor and stream responses as JSON lines
//! - `tlc-cli config show|defaults|validate` - Inspect parameters
//! - `tlc-cli version` - Print the version

use std::path::Path;
use std::process::ExitCode;

use tlc_runtime::cli::{config_cmd, run_cmd, RunOptions};
use tlc_runtime::telemetry::{init_logging, LogConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    if let Err(e) = init_logging(&LogConfig::from_env()) {
        eprintln!("Logging disabled: {}", e);
    }

    match command {
        "run" => {
            let opts = match RunOptions::parse(&args[2..]) {
                Ok(opts) => opts,
                Err(e) => {
                    eprintln!("{}", e);
                    print_command_help("run");
                    return ExitCode::FAILURE;
                }
            };
            exit_code(run_cmd::run(opts).await)
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            let file = tlc_runtime::cli::flag_value(&args, "--file").map(Path::new);
            match subcommand {
                "show" => exit_code(config_cmd::run_show(file)),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit_code(config_cmd::run_validate(file)),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("tlc-cli {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "tlc-cli - batched token-generation executor v{}

USAGE:
    tlc-cli [COMMAND] [OPTIONS]

COMMANDS:
    run          Start an executor and stream responses as JSON lines
    config       Inspect parameters (show, defaults, validate)
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    TLC_ENGINE_PATH       Engine artifact (default: engines/rank0.engine)
    TLC_MAX_BATCH_SIZE    Max sequences per step (default: 8)
    TLC_MAX_BATCH_TOKENS  Max tokens per step (default: 4096)
    TLC_MAX_CONCURRENT    Max live requests (default: 256)
    TLC_MAX_INPUT_LEN     Max prompt tokens (default: 4096)
    TLC_MAX_OUTPUT_LEN    Max new tokens per request (default: 2048)
    TLC_QUEUE_ORDER       fifo or priority (default: fifo)
    TLC_LOG               Log filter (default: info)
    TLC_LOG_FORMAT        json or pretty (default: json)
    TLC_LOG_FILE          Log to this file instead of stderr

EXIT CODES:
    0    Success
    1    Failure
    2    Configuration error
    130  Interrupted",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "run" => {
            eprintln!(
                "tlc-cli run - Stream generated tokens

USAGE:
    tlc-cli run [OPTIONS]

OPTIONS:
    --tokens <LIST>        Comma-separated prompt token ids (default: 1,2,3)
    --max-new-tokens <N>   Tokens to generate per request (default: 16)
    --requests <N>         Number of identical requests (default: 1)
    --temperature <T>      Sampling temperature, 0 is greedy (default: 0)
    --engine <PATH>        Override the engine artifact path
    --file <PATH>          Load parameters from a TOML file

DESCRIPTION:
    Starts an executor backed by the synthetic generator, enqueues the
    requests and prints every response as a JSON line. Ctrl-C shuts the
    executor down; unfinished requests are reported as cancelled.

EXAMPLES:
    tlc-cli run --tokens 1,2,3,4,5 --max-new-tokens 3
    tlc-cli run --requests 4 --temperature 0.8
"
            );
        }
        "config" => {
            eprintln!(
                "tlc-cli config - Inspect parameters

USAGE:
    tlc-cli config <SUBCOMMAND> [--file PATH]

SUBCOMMANDS:
    show           Show effective parameters
    validate       Validate parameters and the engine path
    defaults       Show default parameters

EXAMPLES:
    tlc-cli config show
    tlc-cli config validate --file tlc.toml
    tlc-cli config defaults
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'tlc-cli help' for general usage.",
                command
            );
        }
    }
}
