//! ezmb – one binary that runs the bus *or* acts as an interactive client
//! shell attached to one side.
//
//  $ ezmb start --config ezmb.toml
//  $ ezmb connect ipc:///tmp/ezmb_north.ipc
//  > sub port0_
//  > pub port0_north_topic hello
//  [port0_south_topic] Message 0 from port0
use ezmb::client::{BusReceiver, BusSender};
use ezmb::logging::init_logging;
use ezmb::{BusClient, BusServer, Config, Endpoint};

use anyhow::Context;
use clap::{Parser, Subcommand};
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "ezmb", version, about = "North/south message bus & shell")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the bus.
    Start {
        /// Path to config TOML (env EZMB_CONFIG is used when omitted)
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Attach an interactive shell to one side of a running bus.
    Connect {
        /// tcp://host:port, host:port or ipc:///path
        endpoint: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.cmd {
        Command::Start { config } => start(config.as_deref()).await,
        Command::Connect { endpoint } => {
            let endpoint = Endpoint::parse(&endpoint)?;
            repl(endpoint).await
        }
    }
}

async fn start(config_path: Option<&str>) -> anyhow::Result<()> {
    let cfg = Config::load(config_path).context("loading configuration")?;
    let server = BusServer::bind(cfg).await.context("binding bus endpoints")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bus = tokio::spawn(server.run(shutdown_rx));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("ctrl-c received; shutting down"),
        Err(e) => warn!("failed to listen for ctrl-c: {}", e),
    }
    let _ = shutdown_tx.send(true);

    bus.await??;
    Ok(())
}

// ───────────────────────────────────────────────────────────
// Interactive REPL shell
// ───────────────────────────────────────────────────────────
async fn repl(endpoint: Endpoint) -> anyhow::Result<()> {
    let client = BusClient::connect(&endpoint)
        .await
        .with_context(|| format!("connecting to {endpoint}"))?;
    let (mut sender, receiver) = client.split();

    println!("Connected to {endpoint}. Type `help` for commands.");
    let printer = spawn_printer(receiver);

    // Readline blocks, so it gets its own thread feeding lines back.
    let (line_tx, line_rx) = flume::unbounded::<String>();
    std::thread::spawn(move || {
        let mut rl: Editor<(), DefaultHistory> = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("cannot open line editor: {e}");
                return;
            }
        };
        while let Ok(line) = rl.readline("> ") {
            let _ = rl.add_history_entry(line.as_str());
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    while let Ok(line) = line_rx.recv_async().await {
        if !run_line(&mut sender, &line).await? {
            break;
        }
    }

    let _ = sender.close().await;
    printer.abort();
    Ok(())
}

/// Executes one shell line. Returns `false` when the shell should exit.
async fn run_line<W>(sender: &mut BusSender<W>, line: &str) -> anyhow::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    match line.split_whitespace().collect::<Vec<_>>().as_slice() {
        [] => {}
        ["help"] => println!("pub <topic> <msg> | sub <prefix> | unsub <prefix> | exit"),
        ["exit" | "quit"] => return Ok(false),
        ["pub", topic, rest @ ..] => {
            sender.publish(topic.to_string(), rest.join(" ")).await?;
        }
        // A bare `sub` subscribes to every topic.
        ["sub"] => sender.subscribe("").await?,
        ["sub", prefix] => sender.subscribe(prefix.to_string()).await?,
        ["unsub"] => sender.unsubscribe("").await?,
        ["unsub", prefix] => sender.unsubscribe(prefix.to_string()).await?,
        _ => println!("Unknown cmd. Type `help`."),
    }
    Ok(true)
}

fn spawn_printer<R>(mut receiver: BusReceiver<R>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match receiver.next_message().await {
                Ok(Some(msg)) => println!(
                    "[{}] {}",
                    msg.topic_lossy(),
                    String::from_utf8_lossy(&msg.payload)
                ),
                Ok(None) => {
                    println!("bus closed the connection");
                    break;
                }
                Err(e) => {
                    println!("receive failed: {e}");
                    break;
                }
            }
        }
    })
}
