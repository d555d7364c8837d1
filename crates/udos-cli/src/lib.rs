//! CLI surface: the non-interactive shell entry and the interactive prompt.
//!
//! Both consume the engine's public surface only. Exit codes follow the
//! documented table: 0 success, 2 input invalid, 3 confirmation required,
//! 4 provider failure after chain exhaustion, 5 contract unrepairable.

use std::io::{BufRead, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;

use udos_core::error::{ErrorKind, UdosError};
use udos_core::exit_codes::ExitCode;
use udos_core::types::{Caller, Request, RequestFlags, Response, ResponseStatus};
use udos_engine::Engine;

/// Local offline-first developer console.
#[derive(Parser, Debug)]
#[command(name = "udos", version, about, long_about = None)]
pub struct Cli {
    /// Verbose logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Dispatch a single input through the engine.
    Dispatch {
        /// The input to dispatch (joined with spaces).
        input: Vec<String>,

        /// Attach per-stage route-trace diagnostics.
        #[arg(long)]
        dispatch_debug: bool,

        /// Confirm a previously gated shell command.
        #[arg(long)]
        confirm: bool,

        /// Resolve the route without executing anything.
        #[arg(long)]
        dry_run: bool,

        /// Emit the raw JSON envelope instead of the short rendering.
        #[arg(long)]
        json: bool,
    },

    /// Interactive prompt: dispatch each line until EOF.
    Prompt,

    /// Admin-secret contract operations.
    Contract {
        #[command(subcommand)]
        action: ContractAction,
    },

    /// Run the local-readiness probe.
    Heal {
        /// Execute the repairable actions (pull missing models).
        #[arg(long)]
        repair: bool,
    },

    /// Summarize the local session log.
    Logs,

    /// Run the loopback wizard server.
    Serve,
}

#[derive(Subcommand, Debug)]
pub enum ContractAction {
    /// Report drift between env file, server config, and secret store.
    Status,
    /// Repair drift.
    Repair,
}

/// Parse arguments and run. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();

    if let Err(e) = udos_core::logging::init_tracing(cli.verbose) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    match execute(cli).await {
        Ok(code) => code.as_i32(),
        Err(e) => {
            eprintln!("error: {e}");
            e.to_exit_code().as_i32()
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode, UdosError> {
    match cli.command {
        Command::Dispatch {
            input,
            dispatch_debug,
            confirm,
            dry_run,
            json,
        } => {
            if input.is_empty() {
                return Err(UdosError::new(ErrorKind::InputInvalid, "no input given"));
            }
            let engine = Engine::from_default_paths()?;
            let request = Request::new(input.join(" "), Caller::Shell).with_flags(RequestFlags {
                dispatch_debug,
                confirm,
                dry_run,
                record_input: false,
            });
            let response = engine.dispatch(&request).await;
            render(&response, json);
            Ok(exit_code_for(&response))
        }

        Command::Prompt => {
            let engine = Arc::new(Engine::from_default_paths()?);
            prompt_loop(engine).await
        }

        Command::Contract { action } => {
            let engine = Engine::from_default_paths()?;
            match action {
                ContractAction::Status => {
                    let status = engine.contract_status()?;
                    print_json(&status);
                    Ok(if status.ok {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::CONTRACT_UNREPAIRABLE
                    })
                }
                ContractAction::Repair => {
                    let outcome = engine.repair_contract()?;
                    print_json(&outcome);
                    Ok(if outcome.ok {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::CONTRACT_UNREPAIRABLE
                    })
                }
            }
        }

        Command::Heal { repair } => {
            let engine = Engine::from_default_paths()?;
            let report = engine.self_heal().await;
            print_json(&report);
            if repair && !report.repairable.is_empty() {
                let outcomes = engine.self_heal_repair(&report).await;
                print_json(&outcomes);
            }
            Ok(if report.ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::INTERNAL
            })
        }

        Command::Logs => {
            let engine = Engine::from_default_paths()?;
            let summary = engine.session_summary()?;
            print_json(&summary);
            Ok(ExitCode::SUCCESS)
        }

        Command::Serve => {
            let engine = Arc::new(Engine::from_default_paths()?);
            udos_server::serve(engine).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Dispatch each stdin line until EOF or `exit`.
async fn prompt_loop(engine: Arc<Engine>) -> Result<ExitCode, UdosError> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        write!(stdout, "udos> ").ok();
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "stdin read failed");
                break;
            }
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        let request = Request::new(input, Caller::Interactive);
        let response = engine.dispatch(&request).await;
        render(&response, false);
    }

    Ok(ExitCode::SUCCESS)
}

/// Map a response envelope to the shell exit code.
fn exit_code_for(response: &Response) -> ExitCode {
    match response.status {
        ResponseStatus::Success | ResponseStatus::Skipped => ExitCode::SUCCESS,
        ResponseStatus::Pending => ExitCode::CONFIRMATION_REQUIRED,
        ResponseStatus::Error => response
            .error
            .as_ref()
            .map_or(ExitCode::INTERNAL, |e| match e.code.as_str() {
                "input_invalid" | "no_match" | "shell_blocked" => ExitCode::INPUT_INVALID,
                "confirmation_required" => ExitCode::CONFIRMATION_REQUIRED,
                code if code.starts_with("provider_") => ExitCode::PROVIDER_FAILURE,
                "contract_unrepairable" => ExitCode::CONTRACT_UNREPAIRABLE,
                _ => ExitCode::INTERNAL,
            }),
    }
}

/// Short rendering for humans; `--json` emits the envelope verbatim.
fn render(response: &Response, json: bool) {
    if json {
        print_json(response);
        return;
    }

    use udos_core::types::ResponsePayload;
    match (&response.status, &response.payload) {
        (ResponseStatus::Pending, ResponsePayload::Shell { shell, .. }) => {
            println!(
                "confirmation required: rerun with --confirm to execute '{}'",
                shell.raw
            );
        }
        (_, ResponsePayload::Ucode { command, .. }) => {
            println!("[{}] {}", response.dispatch_to, command);
        }
        (_, ResponsePayload::Shell { output, .. }) => {
            if let Some(output) = output {
                print!("{output}");
            }
        }
        (_, ResponsePayload::Vibe { text, .. }) => {
            println!("{text}");
        }
        (ResponseStatus::Error, _) => {
            if let Some(error) = &response.error {
                eprintln!("{}: {}", error.code, error.message);
            }
        }
        _ => {}
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: failed to serialize output: {e}"),
    }
}
