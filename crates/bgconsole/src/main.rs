//
// main.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! bgconsole
//!
//! Talks to a kernel embedded with bgkernel, given its connection file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use bgkernel::client::{ExecuteOutcome, KernelClient};
use bgkernel::connection_file::{find_existing, ConnectionFile, ConnectionInfo};
use bgkernel::heartbeat;
use bgshared::jupyter_message::JupyterMessage;
use clap::{Parser, Subcommand};
use log::debug;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The kernel to talk to: a connection file path, a file name in the
    /// Jupyter runtime directory, or the bare pid printed by the host
    #[arg(short, long, value_name = "NAME")]
    existing: String,

    /// The Jupyter runtime directory to look in
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Seconds to wait for each reply
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the kernel's info reply
    Info,

    /// Execute code and show everything it produced
    Execute {
        /// The code to execute
        code: String,
    },

    /// Check that the kernel's heartbeat answers
    Heartbeat,

    /// Show the most recent inputs
    History {
        /// How many inputs to show
        #[arg(short, long, default_value_t = 10)]
        n: usize,
    },

    /// Ask the kernel to stop
    Shutdown,
}

fn print_message(message: &JupyterMessage) -> anyhow::Result<()> {
    println!(
        "[{}] --- {}: {} ---\n{}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        message.channel,
        message.header.msg_type,
        serde_json::to_string_pretty(&message.content)?
    );
    Ok(())
}

fn print_outcome(outcome: &ExecuteOutcome) -> anyhow::Result<()> {
    for message in &outcome.iopub {
        print_message(message)?;
    }
    print_message(&outcome.reply)
}

fn load(args: &Args) -> anyhow::Result<ConnectionInfo> {
    let path = find_existing(&args.existing, args.runtime_dir.clone())
        .ok_or_else(|| anyhow!("No connection file found for '{}'", args.existing))?;
    debug!("Using connection file {}", path.display());
    Ok(ConnectionFile::from_file(&path)?)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let info = load(&args)?;
    let timeout = Duration::from_secs(args.timeout);

    if let Commands::Heartbeat = args.command {
        let endpoint = info.endpoint(info.hb_port);
        if !heartbeat::ping(&endpoint, timeout).await {
            return Err(anyhow!("No heartbeat from {}", endpoint));
        }
        println!("Heartbeat from {} OK", endpoint);
        return Ok(());
    }

    let mut client = KernelClient::connect(&info)
        .await
        .context("Failed to attach to the kernel")?
        .with_timeout(timeout);

    match args.command {
        Commands::Info => print_message(&client.kernel_info().await?),
        Commands::Execute { ref code } => print_outcome(&client.execute(code).await?),
        Commands::History { n } => print_message(&client.history_tail(n).await?),
        Commands::Shutdown => print_message(&client.shutdown().await?),
        Commands::Heartbeat => Ok(()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(err) = run(args).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
