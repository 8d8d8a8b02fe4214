use std::io::{self, Write};
use std::process::ExitCode;

use clap::Parser;
use reliable_udp_transport::{Config, Receiver};

/// Receives a reliable UDP transfer and writes the reconstructed bytes to stdout.
#[derive(Parser, Debug)]
struct Args {
    /// Port this receiver sends acks to; data is bound on `port + 1`.
    #[arg(short, long)]
    port: u16,

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

    let config = Config {
        window_size: args.window_size,
        timeout: std::time::Duration::from_secs(args.timeout_secs),
        max_fin_retries: args.max_fin_retries,
    };

    let receiver = match Receiver::new(args.port, config) {
        Ok(receiver) => receiver,
        Err(err) => {
            eprintln!("failed to start receiver: {err}");
            return ExitCode::FAILURE;
        }
    };

    match receiver.run() {
        Ok(delivered) => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            for chunk in delivered {
                if handle.write_all(&chunk).is_err() {
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("receiver failed: {err}");
            ExitCode::FAILURE
        }
    }
}
