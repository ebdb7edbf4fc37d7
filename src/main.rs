use std::error::Error;

use clap::Parser;
use meetpoint::cli::{Cli, Command};
use meetpoint::{RelayedMessage, Rendezvous, SignalingChannel};
use tokio::io::{self, AsyncBufReadExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let rendezvous = Rendezvous::new(config.into_options())?;

    match &cli.command {
        Command::Host { host_id } => run_host(&rendezvous, host_id).await,
        Command::Join { host_id } => run_join(&rendezvous, host_id).await,
    }
}

async fn run_host(rendezvous: &Rendezvous, host_id: &str) -> Result<(), Box<dyn Error>> {
    let channel = rendezvous.host(host_id)?.register().await?;

    println!("   Hosting '{}'", channel.host_id());
    println!("   Waiting for relayed messages, press Ctrl+C to stop\n");

    let mut subscription = channel
        .subscribe(|message| println!("> Peer: {}", message))
        .await?;

    let ended = tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        result = subscription.finished() => Some(result),
    };
    match ended {
        Some(result) => Ok(result?),
        None => {
            subscription.close();
            Ok(())
        }
    }
}

async fn run_join(rendezvous: &Rendezvous, host_id: &str) -> Result<(), Box<dyn Error>> {
    let channel = rendezvous.join(host_id)?.join().await?;

    println!("   Joined '{}'", channel.host_id());
    println!("   Type a message and press Enter:");

    let subscription = channel
        .subscribe(|message| println!("\n> Host: {}", message))
        .await?;

    relay_stdin(&channel).await?;
    subscription.close();
    Ok(())
}

/// Sends each stdin line, as JSON when it parses, otherwise as a string.
async fn relay_stdin(channel: &SignalingChannel) -> Result<(), Box<dyn Error>> {
    let mut stdin = io::BufReader::new(io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message: RelayedMessage =
            serde_json::from_str(&line).unwrap_or(RelayedMessage::String(line));
        channel.send_raw(&message).await?;
    }
    Ok(())
}
