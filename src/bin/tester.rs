use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use reliable_udp_transport::{Config, Intermediary, IntermediaryConfig, Receiver, Sender};

const SENDER_RECV_PORT: u16 = 41729;
const RECEIVER_SEND_PORT: u16 = 41735;

/// Exercises the reliable UDP transport end to end against a configurable lossy,
/// delayed, corrupting channel. Mirrors `original_source/rdt/tester.py`'s argument set.
#[derive(Parser, Debug)]
#[command(name = "rdt-tester", about = "Tests the reliable UDT protocol against various network conditions.")]
struct Args {
    /// Packet drop probability (0.0 - 1.0).
    #[arg(short, long, default_value_t = 0.0)]
    drop: f64,

    /// Range of artificial delay in seconds, e.g. `--delay 0 3`.
    #[arg(short = 'w', long, num_args = 2, default_values_t = vec![0.0, 0.0])]
    delay: Vec<f64>,

    /// Packet corruption probability (0.0 - 1.0), data direction only.
    #[arg(short, long, default_value_t = 0.0)]
    corrupt: f64,
}

fn test_data() -> Vec<Vec<u8>> {
    [
        "LeBron James stepped onto the court with that familiar calm intensity, ",
        "like a king surveying his kingdom before battle. ",
        "The crowds roar swelled to a thunder as the ball hit his hands, one bounce, two bounces, ",
        "and the game slowed down. ",
        "With a quick crossover and a burst of power, he soared toward the rim, ",
        "time itself pausing just long enough for everyone to realize ",
        "they were witnessing greatness again. ",
        "When the dunk landed, so did the cheers,",
        "echoing through the arena like history being written in real time.",
    ]
    .iter()
    .map(|s| s.as_bytes().to_vec())
    .collect()
}

fn main() -> ExitCode {
    reliable_udp_transport::logging::init();
    let args = Args::parse();

    if !(0.0..=1.0).contains(&args.drop) {
        eprintln!("--drop must be between 0 and 1");
        return ExitCode::FAILURE;
    }
    if !(0.0..=1.0).contains(&args.corrupt) {
        eprintln!("--corrupt must be between 0 and 1");
        return ExitCode::FAILURE;
    }
    if args.delay[0] < 0.0 || args.delay[1] < 0.0 || args.delay[0] > args.delay[1] {
        eprintln!("--delay must be two non-negative numbers where MIN <= MAX");
        return ExitCode::FAILURE;
    }

    let intermediary_config = IntermediaryConfig {
        drop_prob: args.drop,
        delay_range: (
            Duration::from_secs_f64(args.delay[0]),
            Duration::from_secs_f64(args.delay[1]),
        ),
        corrupt_prob: args.corrupt,
    };

    let engine_config = Config::default();

    let receiver = match Receiver::new(RECEIVER_SEND_PORT, engine_config) {
        Ok(receiver) => receiver,
        Err(err) => {
            eprintln!("failed to start receiver: {err}");
            return ExitCode::FAILURE;
        }
    };
    let receiver_thread = thread::spawn(move || receiver.run());
    info!("receiver started");

    thread::sleep(Duration::from_secs(1));

    let sender = match Sender::new(SENDER_RECV_PORT, engine_config) {
        Ok(sender) => sender,
        Err(err) => {
            eprintln!("failed to start sender: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!("sender created");

    let intermediary = Intermediary::new(SENDER_RECV_PORT, RECEIVER_SEND_PORT, intermediary_config);
    let running = match intermediary.start() {
        Ok(running) => running,
        Err(err) => {
            eprintln!("failed to start intermediary: {err}");
            return ExitCode::FAILURE;
        }
    };
    info!("intermediary started");

    thread::sleep(Duration::from_secs(1));

    println!("Starting data transfer...");
    if let Err(err) = sender.send(test_data()) {
        eprintln!("data transfer did not complete cleanly: {err}");
    }
    println!("Data transfer initiated");

    let delivered = match receiver_thread.join() {
        Ok(Ok(delivered)) => delivered,
        Ok(Err(err)) => {
            eprintln!("receiver failed: {err}");
            running.shutdown();
            return ExitCode::FAILURE;
        }
        Err(_) => {
            eprintln!("receiver thread panicked");
            running.shutdown();
            return ExitCode::FAILURE;
        }
    };

    running.shutdown();

    let full_message: Vec<u8> = delivered.into_iter().flatten().collect();
    let expected: Vec<u8> = test_data().into_iter().flatten().collect();

    match String::from_utf8(full_message.clone()) {
        Ok(text) => println!("\nFull reconstructed message: {text}"),
        Err(_) => println!("\nFull reconstructed message (not valid utf-8): {full_message:?}"),
    }
    println!("Test completed");

    if full_message == expected {
        ExitCode::SUCCESS
    } else {
        eprintln!("reconstructed message did not match the input");
        ExitCode::FAILURE
    }
}
