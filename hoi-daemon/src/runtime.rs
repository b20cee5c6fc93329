//! Daemon runtime: socket accept loop, serialised reconciliation job
//! queue, periodic store flush and signal handling.
//!
//! Request acceptance is multi-threaded, but reconciliation pipelines are
//! effectively single-threaded: every mutating request flows through a
//! single-consumer job queue, so at most one pipeline mutates host state at
//! a time. Snapshot reads (status) are served directly from the store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};

use hoi_core::server;
use hoi_store::Store;
use hoi_system::Systemctl;

use crate::error::{io_err, DaemonError};
use crate::handlers::Handlers;
use crate::protocol::{Request, Response};

/// How often the store is flushed to disk in the background.
const STORE_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

struct Job {
    request: Request,
    respond_to: oneshot::Sender<Result<Value, String>>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(
    config_path: &Path,
    socket_path: &Path,
    data_path: &Path,
) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(
        config_path.to_path_buf(),
        socket_path.to_path_buf(),
        data_path.to_path_buf(),
    ))
}

/// Run the daemon runtime.
pub async fn run(
    config_path: PathBuf,
    socket_path: PathBuf,
    data_path: PathBuf,
) -> Result<(), DaemonError> {
    let config = server::Config::from_file(&config_path)?;

    if let Some(dir) = data_path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
    }
    let store = Arc::new(Store::new(&data_path));
    store.load()?;
    tracing::info!("store backend ready");

    // Connections are established once and shared across all pipelines;
    // the MySQL pool only when the database subsystem wants it.
    let mysql = if config.database.enabled {
        let opts = mysql::OptsBuilder::new()
            .ip_or_hostname(Some(config.mysql.host.clone()))
            .user(Some(config.mysql.user.clone()))
            .pass(Some(config.mysql.password.clone()));
        let pool = mysql::Pool::new(opts)?;
        tracing::info!("MySQL connection ready");
        Some(pool)
    } else {
        None
    };
    let needs_systemd = config.web.enabled
        || config.php.enabled
        || config.app_service.enabled
        || config.cron.enabled
        || config.worker.enabled
        || config.volume.enabled;
    let systemd = if needs_systemd {
        Systemctl::connect(&config)?
    } else {
        Systemctl::new(config.systemd.use_legacy)
    };

    let handlers = Arc::new(Handlers {
        server: config,
        store: store.clone(),
        mysql,
        systemd,
    });

    let (job_tx, job_rx) = mpsc::channel::<Job>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let handlers = handlers.clone();
        tokio::spawn(async move {
            let result = job_processor_task(handlers, job_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let handlers = handlers.clone();
        let socket = socket_path.clone();
        let job_tx = job_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(socket, handlers, job_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let flush_handle = {
        let shutdown = shutdown_tx.clone();
        let store = store.clone();
        tokio::spawn(async move {
            let result = store_flush_task(store, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move { signal_task(shutdown).await })
    };

    let (processor_result, socket_result, flush_result, signal_result) =
        tokio::join!(processor_handle, socket_handle, flush_handle, signal_handle);

    handle_join("job_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("store_flush", flush_result)?;
    handle_join("signal_handler", signal_result)?;

    // The flusher is joined; flush one final time under the store's own
    // locking and drop the subsystem connections with the handlers.
    store.close()?;
    tracing::info!("store flushed, shutting down");
    Ok(())
}

/// Executes mutating requests strictly one at a time, in arrival order.
async fn job_processor_task(
    handlers: Arc<Handlers>,
    mut job_rx: mpsc::Receiver<Job>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = job_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let handlers = handlers.clone();
                let request = job.request;

                let outcome = tokio::task::spawn_blocking(move || {
                    execute(&handlers, &request).map_err(|e| e.to_string())
                })
                .await
                .map_err(|err| DaemonError::Protocol(format!("job join error: {err}")))?;

                let _ = job.respond_to.send(outcome);
            }
        }
    }
    Ok(())
}

async fn socket_server_task(
    socket: PathBuf,
    handlers: Arc<Handlers>,
    job_tx: mpsc::Sender<Job>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    if let Some(dir) = socket.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
    }
    if socket.exists() {
        std::fs::remove_file(&socket).map_err(|e| io_err(&socket, e))?;
    }

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    tracing::info!("listening for RPC calls on: {}", socket.display());

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let handlers = handlers.clone();
                let job_tx = job_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(stream, handlers, job_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = std::fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    handlers: Arc<Handlers>,
    job_tx: mpsc::Sender<Job>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(&mut writer, &Response::error(format!("invalid request JSON: {err}")))
                    .await?;
                continue;
            }
        };
        tracing::info!("client request for: {}", request.cmd);

        let cmd = request.cmd.clone();
        let response = match cmd.as_str() {
            // Snapshot reads are served directly from the store.
            "status" | "status-all" => match execute(&handlers, &request) {
                Ok(data) => Response::ok(data),
                Err(err) => Response::error(err.to_string()),
            },
            // Everything that mutates host state is serialised through the
            // job queue.
            _ => match enqueue(&job_tx, request).await {
                Ok(data) => Response::ok(data),
                Err(err) => Response::error(err.to_string()),
            },
        };

        write_response(&mut writer, &response).await?;
    }
    Ok(())
}

/// Dispatches one request against the handlers.
fn execute(handlers: &Handlers, request: &Request) -> Result<Value, DaemonError> {
    let path = || -> Result<PathBuf, DaemonError> {
        request
            .path
            .as_deref()
            .map(PathBuf::from)
            .ok_or(DaemonError::MissingField("path"))
    };

    match request.cmd.as_str() {
        "status" => Ok(json!(handlers.status(&path()?)?)),
        "status-all" => Ok(json!(handlers.status_all())),
        "load" => handlers.load(&path()?).map(|()| json!(true)),
        "reload" => handlers.reload(&path()?).map(|()| json!(true)),
        "reload-all" => handlers.reload_all().map(|()| json!(true)),
        "unload" => handlers.unload(&path()?).map(|()| json!(true)),
        "unload-all" => handlers.unload_all().map(|()| json!(true)),
        "domain" => {
            let directive = request
                .domain
                .clone()
                .ok_or(DaemonError::MissingField("domain"))?;
            handlers.domain(&path()?, directive).map(|()| json!(true))
        }
        "dump" => {
            let target = request
                .target
                .as_deref()
                .map(PathBuf::from)
                .ok_or(DaemonError::MissingField("target"))?;
            handlers.dump(&path()?, &target).map(|()| json!(true))
        }
        other => Err(DaemonError::Protocol(format!("unknown command '{other}'"))),
    }
}

async fn enqueue(job_tx: &mpsc::Sender<Job>, request: Request) -> Result<Value, DaemonError> {
    let (tx, rx) = oneshot::channel();
    job_tx
        .send(Job {
            request,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("job queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("job response"))?;
    outcome.map_err(DaemonError::Protocol)
}

/// Persists the store once a minute; mutations persist themselves, this
/// catches anything that slipped.
async fn store_flush_task(
    store: Arc<Store>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(STORE_FLUSH_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let store = store.clone();
                let result = tokio::task::spawn_blocking(move || store.persist()).await;
                match result {
                    Ok(Ok(())) => tracing::debug!("auto stored"),
                    Ok(Err(err)) => tracing::error!(error = %err, "failed to auto store"),
                    Err(err) => tracing::error!(error = %err, "auto store join failure"),
                }
            }
        }
    }
    Ok(())
}

/// SIGINT/SIGTERM shut the daemon down, SIGHUP is a no-op.
async fn signal_task(shutdown_tx: broadcast::Sender<()>) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).map_err(|e| io_err("signal handler", e))?;
    let mut terminate =
        signal(SignalKind::terminate()).map_err(|e| io_err("signal handler", e))?;
    let mut hangup = signal(SignalKind::hangup()).map_err(|e| io_err("signal handler", e))?;
    let mut shutdown_rx = shutdown_tx.subscribe();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interrupt.recv() => {
                tracing::info!("caught SIGINT: shutting down");
                let _ = shutdown_tx.send(());
                break;
            }
            _ = terminate.recv() => {
                tracing::info!("caught SIGTERM: shutting down");
                let _ = shutdown_tx.send(());
                break;
            }
            _ = hangup.recv() => {
                tracing::info!("caught SIGHUP: currently noop");
            }
        }
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &Response,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}
