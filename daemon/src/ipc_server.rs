use anyhow::Result;
use common::{Command, Response, RotaError};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::engine::Engine;

pub async fn start(engine: Arc<Engine>) -> Result<()> {
    serve(&common::get_socket_path(), engine).await
}

async fn serve(socket_path: &Path, engine: Arc<Engine>) -> Result<()> {
    // Remove old socket if it exists
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    log::info!("IPC server listening on: {}", socket_path.display());

    while engine.is_running() {
        // Accept with a timeout so shutdown is noticed
        let accept_result =
            tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, _addr))) => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, engine).await {
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

async fn handle_client(stream: UnixStream, engine: Arc<Engine>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<Command>(&line) {
            Ok(command) => handle_command(command, &engine).await,
            Err(e) => {
                log::warn!("Invalid command: {}", e);
                Response::Error(RotaError::Ipc(format!("Invalid command: {}", e)))
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

/// Run a blocking engine operation off the async workers
async fn blocking<T, F>(engine: &Arc<Engine>, op: F) -> Result<T, RotaError>
where
    F: FnOnce(&Arc<Engine>) -> T + Send + 'static,
    T: Send + 'static,
{
    let engine = engine.clone();
    tokio::task::spawn_blocking(move || op(&engine))
        .await
        .map_err(|e| RotaError::Engine(format!("Engine task failed: {}", e)))
}

async fn handle_command(command: Command, engine: &Arc<Engine>) -> Response {
    log::debug!("Handling command: {:?}", command);

    match command {
        Command::Ping => Response::Pong,

        Command::Status => match blocking(engine, |e| e.status()).await {
            Ok(status) => Response::Status(status),
            Err(e) => Response::Error(e),
        },

        Command::Change => match blocking(engine, |e| e.trigger_change()).await {
            Ok(true) => Response::Ok,
            Ok(false) => Response::Error(RotaError::NotFound("No images found".to_string())),
            Err(e) => Response::Error(e),
        },

        Command::Next => match blocking(engine, |e| e.step_forward()).await {
            Ok(true) => Response::Ok,
            Ok(false) => Response::Error(RotaError::NotFound("No images found".to_string())),
            Err(e) => Response::Error(e),
        },

        Command::Prev => {
            if engine.step_back() {
                Response::Ok
            } else {
                Response::Error(RotaError::Engine(
                    "Already at the oldest image".to_string(),
                ))
            }
        }

        Command::Scroll { forward } => {
            engine.scroll(forward);
            Response::Ok
        }

        Command::Pause => {
            engine.pause();
            Response::Ok
        }

        Command::Resume => {
            engine.resume();
            Response::Ok
        }

        Command::TogglePause => {
            engine.toggle_pause();
            Response::Ok
        }

        Command::Reload => match blocking(engine, |e| e.reload()).await {
            Ok(Ok(())) => Response::Ok,
            Ok(Err(e)) => Response::Error(RotaError::Config(format!("{:#}", e))),
            Err(e) => Response::Error(e),
        },

        Command::Favorite => match blocking(engine, |e| e.move_to_favorites()).await {
            Ok(Ok(())) => Response::Ok,
            Ok(Err(e)) => Response::Error(RotaError::Io(format!("{:#}", e))),
            Err(e) => Response::Error(e),
        },

        Command::Trash => match blocking(engine, |e| e.move_to_trash()).await {
            Ok(Ok(())) => Response::Ok,
            Ok(Err(e)) => Response::Error(RotaError::Io(format!("{:#}", e))),
            Err(e) => Response::Error(e),
        },

        Command::Kill => {
            log::info!("Received kill command");
            engine.shutdown();
            Response::Ok
        }
    }
}
