use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tether_core::config::{run_dir_at, socket_path_at};
use tether_core::BridgeConfig;
use tether_host::HostDocument;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use crate::actions::ActionRegistry;
use crate::context::BridgeContext;
use crate::error::{io_err, BridgeError};
use crate::host::{spawn_host_thread, HostApp};
use crate::protocol::{BridgeRequest, BridgeResponse};
use crate::queue::task_queue;

/// Start the host service and block the current thread until it exits.
pub fn start_blocking<D, F>(
    home: &Path,
    config: BridgeConfig,
    actions: ActionRegistry,
    init: F,
) -> Result<(), BridgeError>
where
    D: HostDocument + 'static,
    F: FnOnce() -> Result<HostApp<D>, BridgeError> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config, actions, init))
}

/// Run the host service: host thread, socket server and signal handler.
///
/// Returns after a `stop` request or ctrl-c, once the host thread has drained
/// its queue.
pub async fn run<D, F>(
    home: PathBuf,
    config: BridgeConfig,
    actions: ActionRegistry,
    init: F,
) -> Result<(), BridgeError>
where
    D: HostDocument + 'static,
    F: FnOnce() -> Result<HostApp<D>, BridgeError> + Send + 'static,
{
    ensure_run_dir(&home)?;
    let socket = socket_path_at(&home, &config.host_version);

    let (queue, runner) = task_queue::<HostApp<D>>(config.queue_capacity);
    let host = spawn_host_thread(runner, init, config.idle_interval())?;
    let context = Arc::new(BridgeContext::new(
        queue.clone(),
        config.wait_timeout(),
        actions,
    ));
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    tracing::info!(
        socket = %socket.display(),
        host_version = %config.host_version,
        "host service starting"
    );

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let context = context.clone();
        let socket = socket.clone();
        let host_version = config.host_version.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                socket,
                host_version,
                context,
                shutdown.clone(),
                shutdown.subscribe(),
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down host service");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(BridgeError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);

    queue.close();
    drop(context);
    let tasks = tokio::task::spawn_blocking(move || host.join())
        .await
        .map_err(|err| BridgeError::ServiceTask {
            task: "host thread",
            reason: err.to_string(),
        })??;
    tracing::info!(tasks, "host service stopped");

    joined("socket server", socket_result)?;
    joined("signal handler", signal_result)?;
    Ok(())
}

async fn socket_server_task<D: HostDocument + 'static>(
    socket: PathBuf,
    host_version: String,
    context: Arc<BridgeContext<D>>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), BridgeError> {
    claim_socket(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    restrict_to_owner(&socket)?;
    tracing::debug!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let context = context.clone();
                let shutdown_tx = shutdown_tx.clone();
                let host_version = host_version.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, context, shutdown_tx, host_version).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client<D: HostDocument + 'static>(
    stream: UnixStream,
    context: Arc<BridgeContext<D>>,
    shutdown_tx: broadcast::Sender<()>,
    host_version: String,
) -> Result<(), BridgeError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("host socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<BridgeRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                reply(
                    &mut writer,
                    &BridgeResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.name();
        tracing::debug!(cmd, "request received");
        let stop = matches!(request, BridgeRequest::Stop);
        let response = match dispatch(&context, request, &host_version).await {
            Ok(data) => BridgeResponse::ok(data),
            Err(err) => {
                tracing::warn!(cmd, error = %err, "request failed");
                BridgeResponse::error(err.to_string())
            }
        };

        reply(&mut writer, &response).await?;
        if stop {
            let _ = shutdown_tx.send(());
            break;
        }
    }

    Ok(())
}

async fn dispatch<D: HostDocument + 'static>(
    context: &BridgeContext<D>,
    request: BridgeRequest,
    host_version: &str,
) -> Result<Value, BridgeError> {
    match request {
        BridgeRequest::Ping => Ok(json!({ "host_version": host_version })),
        BridgeRequest::GetFamilyNames => Ok(serde_json::to_value(context.family_names().await?)?),
        BridgeRequest::GetTypeNames { family } => {
            Ok(serde_json::to_value(context.type_names(family).await?)?)
        }
        BridgeRequest::GetParameters { family, type_name } => Ok(serde_json::to_value(
            context.parameters(family, type_name).await?,
        )?),
        BridgeRequest::CreateOrModify { objects, identity } => Ok(serde_json::to_value(
            context.create_or_modify(objects, identity).await?,
        )?),
        BridgeRequest::GetDocumentName => Ok(Value::String(context.document_name().await?)),
        BridgeRequest::Action { input } => Ok(Value::Object(context.run_action(input).await?)),
        BridgeRequest::Stop => Ok(json!({ "stopping": true })),
    }
}

/// Make `socket` bindable. A host still answering there keeps it; anything
/// else at that path was left behind by a host that did not shut down.
fn claim_socket(socket: &Path) -> Result<(), BridgeError> {
    match fs::symlink_metadata(socket) {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(io_err(socket, err)),
    }
    if StdUnixStream::connect(socket).is_ok() {
        return Err(BridgeError::HostAlreadyRunning {
            socket: socket.to_path_buf(),
        });
    }
    tracing::warn!(socket = %socket.display(), "removing socket left by a previous host");
    match fs::remove_file(socket) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(io_err(socket, err)),
        _ => Ok(()),
    }
}

fn ensure_run_dir(home: &Path) -> Result<(), BridgeError> {
    let run = run_dir_at(home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    Ok(())
}

/// One response per request line.
async fn reply(writer: &mut OwnedWriteHalf, response: &BridgeResponse) -> Result<(), BridgeError> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .map_err(|e| io_err("host socket reply", e))
}

fn joined(
    task: &'static str,
    result: Result<Result<(), BridgeError>, tokio::task::JoinError>,
) -> Result<(), BridgeError> {
    result.map_err(|err| BridgeError::ServiceTask {
        task,
        reason: err.to_string(),
    })?
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Clients must run as the user who started the host.
const SOCKET_MODE: u32 = 0o600;

fn restrict_to_owner(socket: &Path) -> Result<(), BridgeError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(socket, fs::Permissions::from_mode(SOCKET_MODE))
        .map_err(|e| io_err(socket, e))
}
