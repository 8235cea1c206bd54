//! netchan command-line front end
//!
//! ```text
//! netchan leader  --port 8930 --ip localhost
//! netchan agent   --dir /tmp/netchan --port 8931 --leader localhost:8930
//! netchan send    --to <name> [--file <path>] [--port 8931]
//! netchan receive --from <name> [--leader localhost:8930]
//! ```
//!
//! Logging is controlled through `RUST_LOG` (default `info`).

mod commands;

use clap::{Args, Parser, Subcommand};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

/// Named network channels between processes
#[derive(Parser, Debug)]
#[command(name = "netchan")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    tls: TlsArgs,

    #[command(subcommand)]
    command: Command,
}

/// TLS material; when given, every connection the command makes or accepts is encrypted
#[derive(Args, Debug, Default)]
struct TlsArgs {
    /// Certificate presented by this process (PEM)
    #[arg(long, global = true, value_name = "PATH")]
    tls_cert: Option<PathBuf>,

    /// Private key for --tls-cert (PEM)
    #[arg(long, global = true, value_name = "PATH")]
    tls_key: Option<PathBuf>,

    /// CA used to verify the peer (PEM)
    #[arg(long, global = true, value_name = "PATH")]
    tls_ca: Option<PathBuf>,

    /// Name expected in the server certificate
    #[arg(long, global = true, value_name = "NAME")]
    tls_server_name: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the directory service
    Leader(LeaderArgs),
    /// Run a node agent
    Agent(AgentArgs),
    /// Send lines from a file (or stdin) to a channel
    Send(SendArgs),
    /// Print every message of a channel
    Receive(ReceiveArgs),
}

#[derive(Args, Debug)]
struct LeaderArgs {
    #[arg(long, default_value_t = netchan_transport::DEFAULT_LEADER_PORT)]
    port: u16,

    #[arg(long, default_value = "localhost")]
    ip: String,
}

#[derive(Args, Debug)]
struct AgentArgs {
    /// JSON agent configuration; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Scratch directory, created if missing
    #[arg(long)]
    dir: Option<PathBuf>,

    #[arg(long)]
    port: Option<u16>,

    /// Leader endpoint (host:port)
    #[arg(long)]
    leader: Option<String>,

    /// Endpoint published to the leader (host:port)
    #[arg(long)]
    advertise: Option<String>,

    #[arg(long = "dataCenter")]
    data_center: Option<String>,

    #[arg(long)]
    rack: Option<String>,

    /// Concurrent executor slots (default: number of cores)
    #[arg(long = "max.executors")]
    max_executors: Option<usize>,

    /// Relative power of one core
    #[arg(long = "cpu.level")]
    cpu_level: Option<u32>,

    /// Memory budget in MB
    #[arg(long)]
    memory: Option<u64>,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Channel name
    #[arg(long)]
    to: String,

    /// Read messages from this file instead of stdin
    #[arg(long)]
    file: Option<PathBuf>,

    /// Port of the local agent
    #[arg(long, default_value_t = netchan_transport::DEFAULT_AGENT_PORT)]
    port: u16,
}

#[derive(Args, Debug)]
struct ReceiveArgs {
    /// Channel name
    #[arg(long)]
    from: String,

    /// Leader endpoint (host:port)
    #[arg(long, default_value = "localhost:8930")]
    leader: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_agent_flags() {
        let cli = Cli::try_parse_from([
            "netchan",
            "agent",
            "--dir",
            "/tmp/n",
            "--port",
            "9931",
            "--leader",
            "localhost:8930",
            "--dataCenter",
            "dc2",
            "--max.executors",
            "3",
            "--cpu.level",
            "2",
            "--memory",
            "2048",
        ])
        .unwrap();
        match cli.command {
            Command::Agent(args) => {
                assert_eq!(args.port, Some(9931));
                assert_eq!(args.data_center.as_deref(), Some("dc2"));
                assert_eq!(args.max_executors, Some(3));
                assert_eq!(args.cpu_level, Some(2));
                assert_eq!(args.memory, Some(2048));
                assert!(args.rack.is_none());
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn test_defaults_and_global_tls() {
        let cli = Cli::try_parse_from(["netchan", "receive", "--from", "C", "--tls-ca", "ca.pem"])
            .unwrap();
        assert_eq!(cli.tls.tls_ca, Some(PathBuf::from("ca.pem")));
        match cli.command {
            Command::Receive(args) => {
                assert_eq!(args.from, "C");
                assert_eq!(args.leader, "localhost:8930");
            }
            other => panic!("parsed {:?}", other),
        }

        let cli = Cli::try_parse_from(["netchan", "leader"]).unwrap();
        match cli.command {
            Command::Leader(args) => {
                assert_eq!(args.port, 8930);
                assert_eq!(args.ip, "localhost");
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn test_send_requires_channel() {
        assert!(Cli::try_parse_from(["netchan", "send"]).is_err());
    }
}
