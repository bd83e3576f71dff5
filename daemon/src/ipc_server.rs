use anyhow::Result;
use common::{Command, Response, SequenceError};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, mpsc};

use crate::DaemonState;
use crate::driver::DriverCommand;

pub async fn start(
    state: Arc<Mutex<DaemonState>>,
    driver_tx: mpsc::UnboundedSender<DriverCommand>,
) -> Result<()> {
    serve(&common::get_socket_path(), state, driver_tx).await
}

/// Accept clients on `socket_path` until the exit flag is set
pub async fn serve(
    socket_path: &std::path::Path,
    state: Arc<Mutex<DaemonState>>,
    driver_tx: mpsc::UnboundedSender<DriverCommand>,
) -> Result<()> {
    // Remove stale socket
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    log::info!("IPC server listening on: {}", socket_path.display());

    loop {
        if state.lock().await.should_exit {
            break;
        }

        // Poll with a timeout so the exit flag is noticed
        let accept_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, _addr))) => {
                let state = state.clone();
                let tx = driver_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, state, tx).await {
                        log::error!("Error handling client: {}", e);
                    }
                });
            }
            Ok(Err(e)) => {
                log::error!("Error accepting connection: {}", e);
            }
            Err(_) => continue,
        }
    }

    let _ = std::fs::remove_file(socket_path);
    log::info!("IPC server stopped");
    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    state: Arc<Mutex<DaemonState>>,
    driver_tx: mpsc::UnboundedSender<DriverCommand>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Command>(&line) {
            Ok(command) => handle_command(command, &state, &driver_tx).await,
            Err(e) => {
                log::warn!("Invalid command: {}", e);
                Response::Error(SequenceError::Ipc(format!("Invalid command: {}", e)))
            }
        };

        let response_json = serde_json::to_string(&response)?;
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}

pub async fn handle_command(
    command: Command,
    state: &Arc<Mutex<DaemonState>>,
    driver_tx: &mpsc::UnboundedSender<DriverCommand>,
) -> Response {
    log::debug!("Handling command: {:?}", command);

    let driver_command = match command {
        Command::Ping => return Response::Pong,

        Command::Status => return Response::Status(state.lock().await.status()),

        Command::Kill => {
            log::info!("Received kill command");
            state.lock().await.should_exit = true;
            return Response::Ok;
        }

        Command::Start => {
            if state.lock().await.clip_count == 0 {
                return Response::Error(SequenceError::Configuration(
                    "no clips configured".to_string(),
                ));
            }
            DriverCommand::Start
        }
        Command::Stop => DriverCommand::Stop,
        Command::Skip => DriverCommand::Skip,
        Command::Restart => DriverCommand::Restart,
    };

    log::info!("Received {:?}", driver_command);
    if let Err(e) = driver_tx.send(driver_command) {
        return Response::Error(SequenceError::Ipc(format!(
            "Failed to send command to driver: {}",
            e
        )));
    }

    Response::Ok
}
