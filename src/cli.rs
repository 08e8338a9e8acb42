use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{PoolType, Settings};
use crate::rpc::{AgentFactory, RpcClient, RpcServer, READY_MARKER};

/// Troupe - host agents on a server and talk to them remotely
#[derive(Parser, Debug, Clone)]
#[command(name = "troupe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "TROUPE_CONFIG", default_value = "troupe.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start a server and block until it is stopped
    Start(StartArgs),
    /// Ask a running server to stop
    Stop(EndpointArgs),
    /// Print liveness, server info and hosted agents
    Status(EndpointArgs),
}

/// Flags of `start`; each overrides the config file when set
#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// Host name advertised to clients
    #[arg(long, env = "TROUPE_HOST")]
    pub host: Option<String>,

    /// Port to bind; a free port is used when absent or taken
    #[arg(long, env = "TROUPE_PORT")]
    pub port: Option<u16>,

    /// Number of replies run concurrently
    #[arg(long, env = "TROUPE_CAPACITY")]
    pub capacity: Option<usize>,

    #[arg(long, value_enum, env = "TROUPE_POOL_TYPE")]
    pub pool_type: Option<PoolType>,

    /// Maximum number of cached results
    #[arg(long, env = "TROUPE_MAX_POOL_SIZE")]
    pub max_pool_size: Option<usize>,

    /// Seconds a cached result is kept
    #[arg(long, env = "TROUPE_MAX_EXPIRE_TIME")]
    pub max_expire_time: Option<u64>,

    /// Bind loopback only
    #[arg(long, env = "TROUPE_LOCAL_MODE", num_args = 0..=1, default_missing_value = "true")]
    pub local_mode: Option<bool>,

    /// Print the ready line with the bound port on stdout
    #[arg(long)]
    pub announce_port: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    #[arg(long, env = "TROUPE_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long, env = "TROUPE_PORT")]
    pub port: u16,
}

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Start(args) => start(&cli.config, &args).await,
        Command::Stop(endpoint) => stop(&endpoint).await,
        Command::Status(endpoint) => status(&endpoint).await,
    }
}

async fn start(config: &std::path::Path, args: &StartArgs) -> anyhow::Result<ExitCode> {
    let settings = Settings::new_with_cli(config, args)?;
    let factory = Arc::new(AgentFactory::with_builtin_agents());
    let server = RpcServer::bind(&settings, factory).await?;

    if args.announce_port {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{} port={}", READY_MARKER, server.port())?;
        stdout.flush()?;
    }

    server.run().await?;
    Ok(ExitCode::SUCCESS)
}

async fn stop(endpoint: &EndpointArgs) -> anyhow::Result<ExitCode> {
    let client = RpcClient::new(&endpoint.host, endpoint.port)?;
    match client.stop().await {
        Ok(()) => {
            info!(host = %endpoint.host, port = endpoint.port, "Server stopped");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(host = %endpoint.host, port = endpoint.port, error = %e, "Failed to stop server");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn status(endpoint: &EndpointArgs) -> anyhow::Result<ExitCode> {
    let client = RpcClient::new(&endpoint.host, endpoint.port)?;
    if !client.is_alive().await {
        error!(host = %endpoint.host, port = endpoint.port, "Server is not reachable");
        return Ok(ExitCode::FAILURE);
    }

    let info = client.get_server_info().await?;
    let agents = client.get_agent_list().await?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "Server {} is alive at {}:{}", info.server_id, info.host, info.port)?;
    writeln!(
        stdout,
        "pid {}, capacity {}, up {}s, {} pending tasks",
        info.pid, info.capacity, info.uptime_seconds, info.pending_tasks
    )?;
    writeln!(stdout, "{} agents:", agents.len())?;
    for agent in agents {
        writeln!(stdout, "  {}  {}  ({})", agent.id, agent.name, agent.type_name)?;
    }
    Ok(ExitCode::SUCCESS)
}
