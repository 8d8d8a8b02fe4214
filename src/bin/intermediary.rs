use std::io::BufRead;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use reliable_udp_transport::{Intermediary, IntermediaryConfig};

/// Stands between a sender and a receiver, relaying datagrams while applying drop,
/// delay, and corruption in each direction independently. Runs until interrupted.
#[derive(Parser, Debug)]
struct Args {
    /// The sender's recv port (`P_r`).
    #[arg(long)]
    sender_port: u16,

    /// The receiver's send port (`P_s`).
    #[arg(long)]
    receiver_port: u16,

    #[arg(short, long, default_value_t = 0.0)]
    drop: f64,

    #[arg(short = 'w', long, num_args = 2, default_values_t = vec![0.0, 0.0])]
    delay: Vec<f64>,

    #[arg(short, long, default_value_t = 0.0)]
    corrupt: f64,
}

fn main() -> ExitCode {
    reliable_udp_transport::logging::init();
    let args = Args::parse();

    let config = IntermediaryConfig {
        drop_prob: args.drop,
        delay_range: (
            Duration::from_secs_f64(args.delay[0]),
            Duration::from_secs_f64(args.delay[1]),
        ),
        corrupt_prob: args.corrupt,
    };

    if let Err(message) = config.validate() {
        eprintln!("invalid configuration: {message}");
        return ExitCode::FAILURE;
    }

    let intermediary = Intermediary::new(args.sender_port, args.receiver_port, config);
    let running = match intermediary.start() {
        Ok(running) => running,
        Err(err) => {
            eprintln!("failed to start intermediary: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("intermediary running, press enter to stop");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);

    running.shutdown();
    ExitCode::SUCCESS
}
