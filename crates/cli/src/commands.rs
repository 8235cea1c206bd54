//! Subcommand implementations

use crate::{AgentArgs, Cli, Command, LeaderArgs, ReceiveArgs, SendArgs, TlsArgs};
use anyhow::{Context, Result};
use log::info;
use netchan_agent::{AgentConfig, AgentServer};
use netchan_core::{ChannelName, Endpoint};
use netchan_leader::{LeaderConfig, LeaderServer};
use netchan_transport::{SendHandle, TlsSettings, TransportConfig, TransportError, open_receive, open_send};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};

pub async fn run(cli: Cli) -> Result<()> {
    let transport = transport_config(&cli.tls);
    match cli.command {
        Command::Leader(args) => leader(args, transport).await,
        Command::Agent(args) => agent(args, transport).await,
        Command::Send(args) => send(args, transport).await,
        Command::Receive(args) => receive(args, transport).await,
    }
}

fn transport_config(tls: &TlsArgs) -> TransportConfig {
    if tls.tls_cert.is_none() && tls.tls_key.is_none() && tls.tls_ca.is_none() {
        return TransportConfig::plain();
    }
    TransportConfig::with_tls(TlsSettings {
        cert: tls.tls_cert.clone(),
        key: tls.tls_key.clone(),
        ca: tls.tls_ca.clone(),
        server_name: tls.tls_server_name.clone(),
    })
}

async fn leader(args: LeaderArgs, transport: TransportConfig) -> Result<()> {
    let config = LeaderConfig {
        listen: format!("{}:{}", args.ip, args.port),
        transport,
        ..LeaderConfig::default()
    };
    let server = LeaderServer::bind(&config)
        .await
        .with_context(|| format!("starting leader on {}", config.listen))?;
    server.run().await?;
    Ok(())
}

fn agent_config(args: AgentArgs, transport: TransportConfig) -> Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::from_file(path)?,
        None => {
            let mut config = AgentConfig {
                leader: Some(Endpoint::parse("localhost:8930")?),
                ..AgentConfig::default()
            };
            config.resources.max_executors = num_cpus::get();
            config
        }
    };

    if transport.tls.is_some() {
        config.transport.tls = transport.tls;
    }

    if let Some(port) = args.port {
        let host = config
            .listen
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "localhost".to_string());
        config.listen = format!("{}:{}", host, port);
    }
    if let Some(dir) = args.dir {
        config.dir = dir;
    }
    if let Some(leader) = args.leader {
        config.leader = Some(Endpoint::parse(&leader).with_context(|| format!("--leader {}", leader))?);
    }
    if let Some(advertise) = args.advertise {
        config.advertise =
            Some(Endpoint::parse(&advertise).with_context(|| format!("--advertise {}", advertise))?);
    }
    if let Some(data_center) = args.data_center {
        config.data_center = data_center;
    }
    if let Some(rack) = args.rack {
        config.rack = rack;
    }
    if let Some(n) = args.max_executors {
        config.resources.max_executors = n;
    }
    if let Some(level) = args.cpu_level {
        config.resources.cpu_level = level;
    }
    if let Some(memory) = args.memory {
        config.resources.memory_mb = memory;
    }
    Ok(config)
}

async fn agent(args: AgentArgs, transport: TransportConfig) -> Result<()> {
    let config = agent_config(args, transport)?;
    let server = AgentServer::bind(config).await.context("starting agent")?;
    server.run().await?;
    Ok(())
}

async fn send(args: SendArgs, transport: TransportConfig) -> Result<()> {
    let name = ChannelName::new(args.to.as_str())?;
    let broker = Endpoint::new("localhost", args.port)?;

    let input: Box<dyn AsyncRead + Unpin + Send> = match &args.file {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let handle = open_send(&name, &broker, &transport)
        .await
        .with_context(|| format!("opening {} via {}", name, broker))?;
    let sent = forward_lines(handle, input).await?;
    info!("Sent {} messages to {}", sent, name);
    Ok(())
}

/// Send every line of `input` and close the channel.
///
/// If reading the input fails the channel is aborted, so the consumer never
/// takes a partial input for a complete one.
async fn forward_lines<R>(mut handle: SendHandle, input: R) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    match send_lines(&handle, input).await {
        Ok(()) => Ok(handle.close().await?),
        Err(LineError::Send(TransportError::ChannelClosed)) => {
            // The relay stopped on its own; its result says why
            handle.close().await?;
            Err(TransportError::ChannelClosed.into())
        }
        Err(LineError::Send(e)) => {
            handle.abort(&e.to_string()).await;
            Err(e.into())
        }
        Err(LineError::Read(e)) => {
            handle.abort(&format!("input failed: {}", e)).await;
            Err(anyhow::Error::new(e).context("reading input"))
        }
    }
}

enum LineError {
    Read(std::io::Error),
    Send(TransportError),
}

/// One raw message per `\n`-terminated line, bytes taken as they are
async fn send_lines<R>(handle: &SendHandle, input: R) -> std::result::Result<(), LineError>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).split(b'\n');
    while let Some(mut line) = lines.next_segment().await.map_err(LineError::Read)? {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        handle.send(line).await.map_err(LineError::Send)?;
    }
    Ok(())
}

async fn receive(args: ReceiveArgs, transport: TransportConfig) -> Result<()> {
    let name = ChannelName::new(args.from.as_str())?;
    let leader = Endpoint::parse(&args.leader).with_context(|| format!("--leader {}", args.leader))?;
    let mut handle = open_receive(&name, &leader, 0, &transport)
        .await
        .with_context(|| format!("opening {}", name))?;

    let mut stdout = tokio::io::stdout();
    while let Some(msg) = handle.recv().await? {
        stdout.write_all(&msg).await?;
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await?;
    info!("Channel {} closed after {} messages", name, handle.status().count());
    Ok(())
}
