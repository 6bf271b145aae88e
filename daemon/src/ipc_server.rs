use anyhow::{Context, Result};
use common::{Command, ParameterChange, PlaybackError, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, mpsc};

use crate::DaemonState;
use crate::frame_buffer::FrameBuffer;
use crate::log_and_continue;

pub async fn start(
    state: Arc<Mutex<DaemonState>>,
    param_tx: mpsc::UnboundedSender<ParameterChange>,
) -> Result<()> {
    start_at(common::get_socket_path(), state, param_tx).await
}

/// Serve on `socket_path` until the daemon is asked to exit
pub async fn start_at(
    socket_path: PathBuf,
    state: Arc<Mutex<DaemonState>>,
    param_tx: mpsc::UnboundedSender<ParameterChange>,
) -> Result<()> {
    // Remove old socket if it exists
    if socket_path.exists() {
        std::fs::remove_file(&socket_path).with_context(|| {
            format!("Failed to remove stale socket: {}", socket_path.display())
        })?;
    }

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("Failed to bind {}", socket_path.display()))?;
    log::info!("IPC server listening on: {}", socket_path.display());

    loop {
        // Check if we should exit
        if state.lock().await.should_exit {
            break;
        }

        // Accept connections with timeout
        let accept_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, _addr))) => {
                let state = state.clone();
                let tx = param_tx.clone();
                tokio::spawn(async move {
                    log_and_continue!(handle_client(stream, state, tx).await, "handle client");
                });
            }
            Ok(Err(e)) => {
                log::error!("Error accepting connection: {}", e);
            }
            Err(_) => {
                // Timeout, continue loop to check exit condition
                continue;
            }
        }
    }

    // Clean up socket
    let _ = std::fs::remove_file(&socket_path);
    log::info!("IPC server stopped");
    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    state: Arc<Mutex<DaemonState>>,
    param_tx: mpsc::UnboundedSender<ParameterChange>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Command>(&line) {
            Ok(command) => handle_command(command, &state, &param_tx).await,
            Err(e) => {
                log::warn!("Invalid command: {}", e);
                Response::Error(PlaybackError::Ipc(format!("Invalid command: {}", e)))
            }
        };

        // Send response
        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

async fn handle_command(
    command: Command,
    state: &Arc<Mutex<DaemonState>>,
    param_tx: &mpsc::UnboundedSender<ParameterChange>,
) -> Response {
    log::debug!("Handling command: {:?}", command);

    match command {
        Command::Ping => Response::Pong,

        Command::Query => {
            let state = state.lock().await;
            let mut status = state.status.clone();
            status.version = env!("CARGO_PKG_VERSION").to_string();
            status.uptime_secs = state.uptime_secs();
            Response::Status(status)
        }

        Command::SetParameter(change) => {
            log::info!("Setting parameter: {:?}", change);

            if let Err(e) = validate_change(&change) {
                return Response::Error(e);
            }

            match param_tx.send(change) {
                Ok(()) => Response::Ok,
                Err(_) => Response::Error(PlaybackError::Ipc(
                    "Poll loop is not running".to_string(),
                )),
            }
        }

        Command::Snapshot { path } => {
            log::info!("Writing snapshot to {}", path);

            let buffer = state.lock().await.frame_buffer.clone();
            let result =
                tokio::task::spawn_blocking(move || save_snapshot(&buffer, Path::new(&path)))
                    .await;

            match result {
                Ok(Ok(())) => Response::Ok,
                Ok(Err(e)) => Response::Error(PlaybackError::Io(format!("{:#}", e))),
                Err(e) => Response::Error(PlaybackError::Io(format!("Snapshot task failed: {}", e))),
            }
        }

        Command::Kill => {
            log::info!("Received kill command");
            state.lock().await.should_exit = true;
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                std::process::exit(0);
            });
            Response::Ok
        }
    }
}

/// Reject values no input slot can meaningfully hold
fn validate_change(change: &ParameterChange) -> Result<(), PlaybackError> {
    let value = match change {
        ParameterChange::Seek(v)
        | ParameterChange::Speed(v)
        | ParameterChange::StartTime(v)
        | ParameterChange::EndTime(v) => *v,
        _ => return Ok(()),
    };

    if value.is_finite() {
        Ok(())
    } else {
        Err(PlaybackError::Ipc(format!(
            "Invalid value in {:?}: must be a finite number",
            change
        )))
    }
}

/// Write the current shared frame as a PNG
pub fn save_snapshot(buffer: &FrameBuffer, path: &Path) -> Result<()> {
    let (data, width, height) = buffer
        .snapshot()
        .context("No frame has been decoded yet")?;

    let image = image::RgbaImage::from_raw(width, height, data)
        .context("Frame buffer does not match its dimensions")?;

    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    log::info!("Saved {}x{} snapshot to {}", width, height, path.display());
    Ok(())
}
