//! socketor command-line front-end
//!
//! ```text
//! socketor server <port> <operation>
//! socketor client <address> <port> <a> <b>
//! ```
//!
//! Logging is controlled by SOCKETOR_LOG_LEVEL (off|error|warn|info|debug|trace);
//! the accept timeout and worker stack size by SOCKETOR_ACCEPT_TIMEOUT_MS and
//! SOCKETOR_STACK_SIZE.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use socketor::{kerror, kinfo, Operation, Server, ServerConfig};

#[derive(Parser)]
#[command(name = "socketor")]
#[command(about = "Thread-per-connection arithmetic server and client.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve `<a> <operation> <b>` on every connection
    Server {
        port: u16,
        /// `+`, `-`, `*` or `/`; anything else adds
        operation: String,
        /// Dump the effective configuration before serving
        #[arg(long)]
        print_config: bool,
    },
    /// Send two operands and print the server's answer
    Client {
        address: String,
        port: u16,
        a: String,
        b: String,
    },
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("socketor: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();
    socketor::init_logging();

    match cli.command {
        Command::Server {
            port,
            operation,
            print_config,
        } => run_server(port, &operation, print_config),
        Command::Client { address, port, a, b } => run_client(&address, port, &a, &b),
    }
}

fn run_server(port: u16, operation: &str, print_config: bool) -> Result<ExitCode> {
    let config = ServerConfig::from_env().operation(Operation::new(operation));
    if print_config {
        config.print();
    }

    let mut server = Server::bind(port, config)
        .with_context(|| format!("starting server on port {port}"))?;
    kinfo!("Started server with {} operation on {}", operation, server.port());

    // run() returns only on a fatal error
    let err = match server.run() {
        Ok(never) => match never {},
        Err(err) => err,
    };
    kerror!("{}", err);
    std::process::abort()
}

fn run_client(address: &str, port: u16, a: &str, b: &str) -> Result<ExitCode> {
    let response = socketor::request(address, port, a, b)
        .with_context(|| format!("request to {address}:{port}"))?;
    println!("{response}");
    Ok(ExitCode::SUCCESS)
}
