//! Runs an RPC server for the caller
//!
//! In-process mode runs the server on its own thread and runtime, so hosted
//! agents share the caller's process (and stdin). Subprocess mode starts
//! `troupe start --announce-port`; the child prints [`READY_MARKER`] with the
//! bound port once it is listening.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::factory::AgentFactory;
use super::server::RpcServer;
use super::{RpcClient, RpcError, RpcResult};
use crate::config::{ClientSettings, Settings};

/// Line prefix a server started with `--announce-port` prints once bound
pub const READY_MARKER: &str = "TROUPE_READY";

const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    InProcess,
    Subprocess,
}

pub struct ServerLauncher {
    settings: Settings,
    mode: LaunchMode,
    factory: Arc<AgentFactory>,
    program: Option<PathBuf>,
    config_path: Option<PathBuf>,
    startup_timeout: Duration,
}

impl ServerLauncher {
    /// Launch in this process, hosting agents built by `factory`
    pub fn in_process(settings: Settings, factory: Arc<AgentFactory>) -> Self {
        Self {
            settings,
            mode: LaunchMode::InProcess,
            factory,
            program: None,
            config_path: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// Launch a child `troupe` process; it hosts the built-in agent types
    pub fn subprocess(settings: Settings) -> Self {
        Self {
            settings,
            mode: LaunchMode::Subprocess,
            factory: Arc::new(AgentFactory::new()),
            program: None,
            config_path: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// Binary to start in subprocess mode; defaults to the current executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Config file handed to the child process
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub async fn launch(self) -> RpcResult<LaunchedServer> {
        match self.mode {
            LaunchMode::InProcess => self.launch_in_process().await,
            LaunchMode::Subprocess => self.launch_subprocess().await,
        }
    }

    async fn launch_in_process(self) -> RpcResult<LaunchedServer> {
        let (ready_tx, ready_rx) = oneshot::channel::<RpcResult<(u16, CancellationToken)>>();
        let settings = self.settings.clone();
        let factory = self.factory.clone();

        let thread = std::thread::Builder::new()
            .name("troupe-rpc-server".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(settings.server.capacity.max(1))
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                runtime.block_on(async move {
                    match RpcServer::bind(&settings, factory).await {
                        Ok(server) => {
                            let stop = server.servicer().stop_token();
                            let _ = ready_tx.send(Ok((server.port(), stop)));
                            if let Err(e) = server.run().await {
                                error!(error = %e, "RPC server failed");
                            }
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                        }
                    }
                });
            })?;

        let (port, stop) = tokio::time::timeout(self.startup_timeout, ready_rx)
            .await
            .map_err(|_| RpcError::Timeout("server startup".to_string()))?
            .map_err(|_| RpcError::Server("server thread exited before becoming ready".to_string()))??;

        info!(port, "Launched in-process RPC server");
        Ok(LaunchedServer::new(
            &self.settings,
            port,
            LaunchMode::InProcess,
            Some(stop),
            ServerHandle::Thread(thread),
        ))
    }

    async fn launch_subprocess(self) -> RpcResult<LaunchedServer> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };
        let server = &self.settings.server;

        let mut command = tokio::process::Command::new(&program);
        if let Some(config) = &self.config_path {
            command.arg("--config").arg(config);
        }
        command
            .arg("start")
            .args(["--host", &server.host])
            .args(["--capacity", &server.capacity.to_string()])
            .args(["--max-pool-size", &server.max_pool_size.to_string()])
            .args(["--max-expire-time", &server.max_expire_time.to_string()])
            .args(["--local-mode", &server.local_mode.to_string()]);
        if let Some(port) = server.port {
            command.args(["--port", &port.to_string()]);
        }
        command
            .arg("--announce-port")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        debug!(program = %program.display(), "Starting server process");
        let mut child = command.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RpcError::Server("server process has no stdout".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let announced = tokio::time::timeout(self.startup_timeout, async {
            while let Some(line) = lines.next_line().await? {
                if let Some(port) = parse_ready_line(&line) {
                    return Ok(port);
                }
            }
            Err(RpcError::Server(
                "server process exited before becoming ready".to_string(),
            ))
        })
        .await;

        let port = match announced {
            Ok(Ok(port)) => port,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                let _ = child.kill().await;
                return Err(RpcError::Timeout("server startup".to_string()));
            }
        };

        // The child must never block on a full stdout pipe
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "troupe::server_process", "{}", line);
            }
        });

        info!(port, pid = ?child.id(), "Launched RPC server process");
        Ok(LaunchedServer::new(
            &self.settings,
            port,
            LaunchMode::Subprocess,
            None,
            ServerHandle::Process(child),
        ))
    }
}

/// Port announced by a `TROUPE_READY port=<n>` line
pub fn parse_ready_line(line: &str) -> Option<u16> {
    line.trim()
        .strip_prefix(READY_MARKER)?
        .trim()
        .strip_prefix("port=")?
        .parse()
        .ok()
}

enum ServerHandle {
    Thread(std::thread::JoinHandle<()>),
    Process(Child),
}

/// A running server owned by its launcher
pub struct LaunchedServer {
    host: String,
    port: u16,
    mode: LaunchMode,
    stop: Option<CancellationToken>,
    handle: Mutex<Option<ServerHandle>>,
    grace: Duration,
    client_settings: ClientSettings,
}

impl LaunchedServer {
    fn new(
        settings: &Settings,
        port: u16,
        mode: LaunchMode,
        stop: Option<CancellationToken>,
        handle: ServerHandle,
    ) -> Self {
        Self {
            host: settings.server.host.clone(),
            port,
            mode,
            stop,
            handle: Mutex::new(Some(handle)),
            grace: Duration::from_secs(settings.server.shutdown_grace_seconds),
            client_settings: settings.client.clone(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port the server actually bound
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn mode(&self) -> LaunchMode {
        self.mode
    }

    pub fn client(&self) -> RpcResult<RpcClient> {
        RpcClient::with_settings(&self.host, self.port, self.client_settings.clone())
    }

    /// Stop the server; later calls do nothing
    ///
    /// A thread that does not finish within the grace period is detached;
    /// a process is killed.
    pub async fn shutdown(&self) -> RpcResult<()> {
        let Some(handle) = self.handle.lock().await.take() else {
            return Ok(());
        };

        match handle {
            ServerHandle::Thread(thread) => {
                if let Some(stop) = &self.stop {
                    stop.cancel();
                }
                let joined = tokio::task::spawn_blocking(move || thread.join());
                match tokio::time::timeout(self.grace, joined).await {
                    Ok(_) => info!(port = self.port, "In-process RPC server stopped"),
                    Err(_) => warn!(
                        port = self.port,
                        "Server thread did not stop within the grace period, detaching"
                    ),
                }
            }
            ServerHandle::Process(mut child) => {
                if let Err(e) = self.client()?.stop().await {
                    debug!(error = %e, "Stop request failed, waiting for exit anyway");
                }
                match tokio::time::timeout(self.grace, child.wait()).await {
                    Ok(Ok(status)) => info!(port = self.port, %status, "RPC server process exited"),
                    Ok(Err(e)) => warn!(error = %e, "Failed waiting for server process"),
                    Err(_) => {
                        warn!(port = self.port, "Server process did not exit in time, killing it");
                        child.kill().await?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Drop for LaunchedServer {
    fn drop(&mut self) {
        // Processes are killed on drop by their handle
        if let Some(stop) = &self.stop {
            stop.cancel();
        }
    }
}
