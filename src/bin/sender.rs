use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use clap::Parser;
use reliable_udp_transport::chunker::{self, DEFAULT_CHUNK_SIZE};
use reliable_udp_transport::{Config, Sender};

/// Sends a file (or stdin) over the reliable UDP transport to a waiting receiver.
#[derive(Parser, Debug)]
struct Args {
    /// Port this sender binds for acks; data is sent to `port + 1`.
    #[arg(short, long)]
    port: u16,

    /// File to send. Reads from stdin if omitted.
    #[arg(short, long)]
    file: Option<String>,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    #[arg(long, default_value_t = 100)]
    window_size: u32,

    #[arg(long, default_value_t = 8)]
    timeout_secs: u64,

    #[arg(long, default_value_t = 5)]
    max_fin_retries: u32,
}

fn main() -> ExitCode {
    reliable_udp_transport::logging::init();
    let args = Args::parse();

    let data = match &args.file {
        Some(path) => match fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                eprintln!("failed to read {path}: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => {
            let mut buf = Vec::new();
            if let Err(err) = io::stdin().read_to_end(&mut buf) {
                eprintln!("failed to read stdin: {err}");
                return ExitCode::FAILURE;
            }
            buf
        }
    };

    let chunks = chunker::chunk(&data, args.chunk_size);

    let config = Config {
        window_size: args.window_size,
        timeout: std::time::Duration::from_secs(args.timeout_secs),
        max_fin_retries: args.max_fin_retries,
    };

    let sender = match Sender::new(args.port, config) {
        Ok(sender) => sender,
        Err(err) => {
            eprintln!("failed to start sender: {err}");
            return ExitCode::FAILURE;
        }
    };

    match sender.send(chunks) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("transfer did not complete cleanly: {err}");
            ExitCode::FAILURE
        }
    }
}
