//! udos CLI binary.
//!
//! All logic lives in the library crates; main only runs the CLI and maps
//! its result to a process exit code.

#[tokio::main]
async fn main() {
    let code = udos_cli::run().await;
    std::process::exit(code);
}
