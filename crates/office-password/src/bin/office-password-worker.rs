use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use office_password::worker::{install_panic_hook, serve_one, DEFAULT_MAX_INPUT_BYTES};

#[derive(Parser)]
#[command(
    about = "Password-protect one OOXML package read as a JSON line from stdin; answers with one JSON line on stdout."
)]
struct Args {
    /// Maximum size of the request line in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_INPUT_BYTES)]
    max_input_bytes: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    install_panic_hook();

    let stdin = io::stdin();
    let stdout = io::stdout();
    serve_one(&mut stdin.lock(), &mut stdout.lock(), args.max_input_bytes)
        .context("failed to write office-password worker response")?;
    Ok(())
}
