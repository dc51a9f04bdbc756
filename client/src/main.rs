use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{Command, EngineStatus, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "rotactl")]
#[command(about = "Rota wallpaper rotation control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Go forward in history, or show a fresh image at the newest entry
    Next,

    /// Go back to the previous image
    Prev,

    /// Show a fresh image right away
    Change,

    /// Simulate one scroll-wheel step (debounced by the daemon)
    Scroll {
        /// Scroll towards older images instead of newer ones
        #[arg(short, long)]
        back: bool,
    },

    /// Stop periodic changes
    Pause,

    /// Resume periodic changes
    Resume,

    /// Toggle periodic changes
    Toggle,

    /// Re-read the configuration file
    Reload,

    /// Show engine status
    Status,

    /// Move the current image into the favorites folder
    Favorite,

    /// Move the current image to the trash
    Trash,

    /// Check whether the daemon is running
    Ping,

    /// Stop the daemon
    Kill,
}

impl Commands {
    fn into_command(self) -> Command {
        match self {
            Self::Next => Command::Next,
            Self::Prev => Command::Prev,
            Self::Change => Command::Change,
            Self::Scroll { back } => Command::Scroll { forward: !back },
            Self::Pause => Command::Pause,
            Self::Resume => Command::Resume,
            Self::Toggle => Command::TogglePause,
            Self::Reload => Command::Reload,
            Self::Status => Command::Status,
            Self::Favorite => Command::Favorite,
            Self::Trash => Command::Trash,
            Self::Ping => Command::Ping,
            Self::Kill => Command::Kill,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match send_command(cli.command.into_command()).await {
        Ok(response) => {
            handle_response(response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nIs the daemon running? Try starting it with: rota");
            std::process::exit(1);
        }
    }
}

async fn send_command(command: Command) -> Result<Response> {
    let socket_path = common::get_socket_path();

    let stream = UnixStream::connect(&socket_path).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Send command
    let command_json = serde_json::to_string(&command)?;
    writer.write_all(command_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    // Read response
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
        Response::Error(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
        Response::Status(status) => print_status(&status),
        Response::Pong => {
            println!("✓ Daemon is running");
        }
    }
}

fn print_status(status: &EngineStatus) {
    println!("Rota Status:");
    println!("  Version: {}", status.version);
    println!("  Uptime: {}s", status.uptime_secs);
    println!("  State: {}", status.state_label());
    match status.current {
        Some(ref current) => println!("  Current: {}", current),
        None => println!("  Current: (unknown)"),
    }
    if let Some(ref label) = status.origin_label {
        println!("  Origin: {}", label);
    }
    if let Some(ref url) = status.origin_url {
        println!("  Origin URL: {}", url);
    }
    if let Some(ref last) = status.last_change {
        println!("  Last change: {}", last);
    }
    println!(
        "  History: {} of {}{}",
        status.position + 1,
        status.history_len,
        if status.can_step_back { "" } else { " (oldest)" }
    );
    println!("  Prepared: {}", status.prepared);
    println!("  Known images: {}", status.image_count);
}
