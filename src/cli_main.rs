//! Command-line client.
//!
//! Sends one command to a running server and pretty-prints the reply:
//!
//! ```text
//! minkv-cli set greeting hello
//! minkv-cli get greeting
//! minkv-cli --port 4321 zquery board 0 "" 0 10
//! ```

use anyhow::Context;
use clap::Parser;

use minkv::config::DEFAULT_PORT;
use minkv::{render_response, Client};

#[derive(Parser)]
#[command(name = "minkv-cli", about = "Send one command to a minkv server")]
struct Args {
    /// Server host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// The command and its arguments, e.g. `set key value`.
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut client = Client::connect((args.host.as_str(), args.port))
        .with_context(|| format!("connect to {}:{}", args.host, args.port))?;
    let argv: Vec<&[u8]> = args.command.iter().map(|word| word.as_bytes()).collect();
    let reply = client.query(&argv).context("query")?;
    print!("{}", render_response(&reply)?);
    Ok(())
}
