//
// main.rs
//
// Copyright (C) 2026 Posit Software, PBC. All rights reserved.
// Licensed under the MIT License. See LICENSE.txt for license information.
//
//

//! Demo host: embeds a kernel and keeps its main thread busy until Ctrl+C.

use std::fs::File;
use std::time::Duration;

use bgkernel::engine::EngineHome;
use bgkernel::StartOptions;
use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode, WriteLogger};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The path of the connection file to write. If omitted, `kernel.json`
    /// in the Jupyter runtime directory is used.
    #[arg(long)]
    connection_file: Option<String>,

    /// Don't add "-<pid>" to the connection file name
    #[arg(long)]
    no_connection_file_with_pid: bool,

    /// Send output written by the kernel's thread to the attached client
    #[arg(long)]
    redirect_stdio: bool,

    /// Bind to the address this machine's host name resolves to, so clients
    /// on other machines can attach
    #[arg(long)]
    allow_remote_connections: bool,

    /// Build the engine on the main thread instead of the kernel's thread
    #[arg(long)]
    engine_on_host_thread: bool,

    /// Keep input history in this SQLite file instead of in memory
    #[arg(long)]
    history_file: Option<String>,

    /// The banner clients show on connect
    #[arg(long)]
    banner: Option<String>,

    /// The path to a log file. If specified, log output will be written to this
    /// file in addition to standard streams.
    #[arg(long)]
    log_file: Option<String>,

    /// The log level to use. Valid values are "trace", "debug", "info", "warn",
    /// and "error". If not specified, the default log level is "info", or the
    /// value of `RUST_LOG` if set.
    #[arg(short, long)]
    log_level: Option<String>,
}

fn init_logging(args: &Args) {
    // Derive the log level
    let log_level = match args.log_level {
        Some(ref level) => level.to_string(),
        None => std::env::var("RUST_LOG").unwrap_or_else(|_| String::from("info")),
    };

    let log_level = match log_level.as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            println!("Invalid log level '{}'; using 'info'", log_level);
            LevelFilter::Info
        }
    };

    let term_logger = TermLogger::new(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
    let result = match args.log_file {
        Some(ref log_file) => {
            let file = match File::create(log_file) {
                Ok(file) => file,
                Err(err) => {
                    println!("Failed to create log file {}: {}", log_file, err);
                    std::process::exit(1);
                }
            };
            CombinedLogger::init(vec![
                term_logger,
                WriteLogger::new(log_level, Config::default(), file),
            ])
        }
        None => CombinedLogger::init(vec![term_logger]),
    };

    // Consider it a fatal error if we can't initialize logging
    if let Err(err) = result {
        println!("Failed to initialize logging: {}", err);
        std::process::exit(1);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    init_logging(&args);

    let mut options = StartOptions::default()
        .with_variable("demo_var", serde_json::json!(42))
        .with_pid_suffix(!args.no_connection_file_with_pid)
        .with_redirect_stdio(args.redirect_stdio)
        .with_remote_connections(args.allow_remote_connections);
    if let Some(ref path) = args.connection_file {
        options = options.with_connection_file(path);
    }
    if let Some(ref path) = args.history_file {
        options = options.with_history_file(path);
    }
    if let Some(ref banner) = args.banner {
        options = options.with_banner(banner);
    }
    if args.engine_on_host_thread {
        options = options.with_engine_home(EngineHome::HostThread);
    }

    let kernel = match bgkernel::start(options) {
        Ok(kernel) => kernel,
        Err(err) => {
            err.log();
            std::process::exit(1);
        }
    };

    // The kernel lives on its own thread; this stands in for the host's own
    // main loop
    println!("Running endless loop now... Press Ctrl+C to quit.");
    let mut ticks = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted; stopping the kernel");
                kernel.interrupt();
                break;
            }
            _ = ticks.tick() => {
                if kernel.is_finished() {
                    log::info!("The kernel stopped");
                    break;
                }
            }
        }
    }

    let joined = tokio::task::spawn_blocking(move || kernel.join()).await;
    if !matches!(joined, Ok(Ok(()))) {
        log::error!("The kernel thread did not shut down cleanly");
    }
}
