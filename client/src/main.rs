use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use common::{Command, NodeStatus, ParameterChange, Response};
use std::fmt::Write as _;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "handoverctl")]
#[command(about = "Seamless video handover daemon control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(s: Switch) -> Self {
        matches!(s, Switch::On)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Play a URL or file; while playing, it is pre-buffered and swapped in
    Url {
        /// Source URL or path, empty string stops playback
        url: String,
    },

    /// Pause playback
    Pause,

    /// Resume playback
    Resume,

    /// Restart from the beginning at the end of the video
    Loop { state: Switch },

    /// Output black frames instead of video
    Blackout { state: Switch },

    /// Seek to a position
    Seek {
        /// Fraction of the duration (0.0-1.0)
        #[arg(value_parser = parse_fraction)]
        position: f32,
    },

    /// Set the playback rate (e.g., 0.5 for half speed, 2.0 for double speed)
    Speed { rate: f32 },

    /// Start every pass at this offset
    Start {
        /// Offset in seconds
        seconds: f32,
    },

    /// End every pass at this offset
    End {
        /// Offset in seconds, 0 plays to the end
        seconds: f32,
    },

    /// Hold a ready handover until `cue` instead of swapping at once
    CueMode { state: Switch },

    /// Swap in the ready handover (with cue mode on)
    Cue,

    /// Show the engine status table
    Status,

    /// Save the current frame as PNG
    Snapshot {
        /// Output file
        path: String,
    },

    /// Check if daemon is running
    Ping,

    /// Stop the daemon
    Kill,
}

fn parse_fraction(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{}", e))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} is not between 0.0 and 1.0", value))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Url { url } => Command::SetParameter(ParameterChange::Url(url)),
        Commands::Pause => Command::SetParameter(ParameterChange::Paused(true)),
        Commands::Resume => Command::SetParameter(ParameterChange::Paused(false)),
        Commands::Loop { state } => Command::SetParameter(ParameterChange::Looping(state.into())),
        Commands::Blackout { state } => {
            Command::SetParameter(ParameterChange::Blackout(state.into()))
        }
        Commands::Seek { position } => Command::SetParameter(ParameterChange::Seek(position)),
        Commands::Speed { rate } => Command::SetParameter(ParameterChange::Speed(rate)),
        Commands::Start { seconds } => Command::SetParameter(ParameterChange::StartTime(seconds)),
        Commands::End { seconds } => Command::SetParameter(ParameterChange::EndTime(seconds)),
        Commands::CueMode { state } => {
            Command::SetParameter(ParameterChange::SwitchOnCue(state.into()))
        }
        Commands::Cue => Command::SetParameter(ParameterChange::SwitchCue),
        Commands::Status => Command::Query,
        Commands::Snapshot { path } => {
            // The daemon resolves paths against its own working directory
            let path = std::path::absolute(&path)
                .with_context(|| format!("Invalid snapshot path: {}", path))?;
            Command::Snapshot {
                path: path.display().to_string(),
            }
        }
        Commands::Ping => Command::Ping,
        Commands::Kill => Command::Kill,
    };

    match send_command(command).await {
        Ok(response) => {
            handle_response(response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nIs the daemon running? Try starting it with: handoverd");
            std::process::exit(1);
        }
    }
}

async fn send_command(command: Command) -> Result<Response> {
    let socket_path = common::get_socket_path();

    let stream = UnixStream::connect(&socket_path)
        .await
        .with_context(|| format!("Failed to connect to {}", socket_path.display()))?;
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
        Response::Status(status) => {
            print!("{}", format_status(&status));
        }
        Response::Pong => {
            println!("✓ Daemon is running");
        }
    }
}

/// Render the status table with names padded to a common width
fn format_status(status: &NodeStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Daemon Status:");
    let _ = writeln!(out, "  Version: {}", status.version);
    let _ = writeln!(out, "  Uptime: {}s", status.uptime_secs);
    let _ = writeln!(
        out,
        "  Output: {}x{}",
        status.format.width, status.format.height
    );
    let _ = writeln!(out, "Engine:");

    let width = status.rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
    for row in &status.rows {
        let _ = writeln!(out, "  {:<width$}  {}", row.name, row.value, width = width);
    }

    for (label, message) in [
        ("Warning", &status.warning),
        ("Error", &status.error),
        ("Info", &status.info),
    ] {
        if let Some(message) = message {
            let _ = writeln!(out, "{}: {}", label, message);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{InfoRow, OutputFormat};

    #[test]
    fn test_parse_fraction() {
        assert_eq!(parse_fraction("0.5"), Ok(0.5));
        assert!(parse_fraction("1.5").is_err());
        assert!(parse_fraction("half").is_err());
    }

    #[test]
    fn test_format_status_aligns_rows() {
        let status = NodeStatus {
            version: "0.1.0".to_string(),
            format: OutputFormat::new(1280, 720),
            rows: vec![
                InfoRow {
                    name: "URL".to_string(),
                    value: "a.mp4".to_string(),
                },
                InfoRow {
                    name: "handoverState".to_string(),
                    value: "Ready".to_string(),
                },
            ],
            error: Some("Decode error: broken".to_string()),
            ..Default::default()
        };

        let text = format_status(&status);
        assert!(text.contains("  Output: 1280x720\n"));
        assert!(text.contains("  URL            a.mp4\n"));
        assert!(text.contains("  handoverState  Ready\n"));
        assert!(text.contains("Error: Decode error: broken\n"));
        assert!(!text.contains("Warning:"));
    }

    #[test]
    fn test_cli_parses_switches() {
        let cli = Cli::try_parse_from(["handoverctl", "loop", "on"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Loop {
                state: Switch::On
            }
        ));

        let cli = Cli::try_parse_from(["handoverctl", "cue-mode", "off"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::CueMode {
                state: Switch::Off
            }
        ));

        assert!(Cli::try_parse_from(["handoverctl", "seek", "2"]).is_err());
    }
}
