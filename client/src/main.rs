use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{Command, Response, SequenceStatus};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "clipctl")]
#[command(about = "Clipchain sequencer control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ping the daemon to check if it's running
    Ping,

    /// Show the sequence phase, clips and messages
    Status,

    /// Start an inert sequence
    Start,

    /// Stop the running sequence and release its resources
    Stop,

    /// Move on to the next clip at the next advance (leaves a looping clip)
    Skip,

    /// Stop the sequence and start it again from the first clip
    Restart,

    /// Kill the running daemon
    Kill,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Ping => Command::Ping,
        Commands::Status => Command::Status,
        Commands::Start => Command::Start,
        Commands::Stop => Command::Stop,
        Commands::Skip => Command::Skip,
        Commands::Restart => Command::Restart,
        Commands::Kill => Command::Kill,
    };

    match send_command(command).await {
        Ok(response) => {
            handle_response(response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nIs the daemon running? Try starting it with: clipchain");
            std::process::exit(1);
        }
    }
}

async fn send_command(command: Command) -> Result<Response> {
    let socket_path = common::get_socket_path();

    let stream = UnixStream::connect(&socket_path).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let command_json = serde_json::to_string(&command)?;
    writer.write_all(command_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    let mut response_line = String::new();
    reader.read_line(&mut response_line).await?;

    let response: Response = serde_json::from_str(&response_line)?;
    Ok(response)
}

fn handle_response(response: Response) {
    match response {
        Response::Ok => {
            println!("✓ Success");
        }
        Response::Pong => {
            println!("✓ Daemon is running");
        }
        Response::Error(e) => {
            eprintln!("✗ {} error: {}", e.kind_label(), e);
            std::process::exit(1);
        }
        Response::Status(status) => print_status(&status),
    }
}

fn print_status(status: &SequenceStatus) {
    println!("Sequence Status:");
    println!("  Version: {}", status.version);
    println!("  Uptime: {}s", status.uptime_secs);
    println!("  Phase: {}", status.phase);

    match status.clips.get(status.active_index) {
        Some(clip) if status.phase.has_active_clip() => {
            println!("  Active clip: #{} {}", status.active_index, clip.source)
        }
        _ => println!("  Active clip: none"),
    }

    println!("  Clips:");
    if status.clips.is_empty() {
        println!("    (none configured)");
    }
    for (index, clip) in status.clips.iter().enumerate() {
        let marker = if index == status.active_index { '>' } else { ' ' };
        let duration = clip
            .duration_ms
            .map(|ms| format!("{:.2}s", ms as f64 / 1000.0))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   {} {:>2}  {:<8} {:>8}  {}{}",
            marker,
            index,
            clip.rule.name(),
            duration,
            clip.source,
            if clip.resolved { "" } else { " (unresolved)" }
        );
    }

    if !status.messages.is_empty() {
        println!("  Messages:");
        for message in &status.messages {
            let mark = if message.is_error() { '✗' } else { '✓' };
            println!("    {} {}", mark, message.text);
        }
    }
}
