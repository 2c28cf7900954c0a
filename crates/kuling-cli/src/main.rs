//! Kuling command-line tool.
//!
//! Runs the standalone server and mirrors every wire command for ad-hoc
//! use:
//!
//! ```bash
//! # Start a server
//! kuling server standalone --address 127.0.0.1:7777 --data-dir /var/lib/kuling
//!
//! # Talk to it
//! kuling create --topic orders --num-shards 4
//! kuling put --topic orders --shard 0 --key user-1 --message '{"qty": 2}'
//! kuling get --topic orders --shard 0 --offset-sequence-id 1 --max-num-messages 10
//! kuling iters --group analytics --client worker-1 --topic orders
//! kuling commit --iter analytics/orders/0 --offset-sequence-id 2
//! ```
//!
//! Exit code 0 on success, 1 on any error.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use kuling_broker::{Broker, RedbIterStore};
use kuling_client::Client;
use kuling_server::{Server, ServerConfig};
use kuling_storage::{LogStore, StoreConfig};

/// File name of the iterator store inside the data directory.
const BROKER_DB: &str = "broker.db";

#[derive(Parser)]
#[command(name = "kuling")]
#[command(about = "Kuling append-only message log", long_about = None)]
struct Cli {
    /// Server address for client commands
    #[arg(
        short,
        long,
        global = true,
        env = "KULING_ADDR",
        default_value = "127.0.0.1:7777"
    )]
    address: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Server commands
    Server {
        #[command(subcommand)]
        command: ServerCommands,
    },
    /// Check that the server is alive
    Ping,
    /// Create a topic
    Create {
        #[arg(short, long)]
        topic: String,
        /// Number of shards, fixed for the topic's lifetime
        #[arg(short, long, default_value = "10")]
        num_shards: u32,
    },
    /// List topics
    List,
    /// Show the shard count of a topic
    Describe {
        #[arg(short, long)]
        topic: String,
    },
    /// Delete a topic and all its data
    Delete {
        #[arg(short, long)]
        topic: String,
    },
    /// Append a message to a topic shard
    Put {
        #[arg(short, long)]
        topic: String,
        #[arg(short, long)]
        shard: String,
        #[arg(short, long)]
        key: String,
        #[arg(short, long)]
        message: String,
    },
    /// Fetch messages from a topic shard
    Get {
        #[arg(short, long)]
        topic: String,
        #[arg(short, long)]
        shard: String,
        /// Sequence id to start reading from
        #[arg(short, long, default_value = "1")]
        offset_sequence_id: i64,
        /// Maximum messages to receive back
        #[arg(short, long, default_value = "1")]
        max_num_messages: i64,
    },
    /// Join a consumer group and list the iterators assigned to a client
    Iters {
        #[arg(short, long)]
        group: String,
        #[arg(short, long)]
        client: String,
        #[arg(short, long)]
        topic: String,
    },
    /// Commit an iterator offset
    Commit {
        /// Iterator (or iterator id) to commit
        #[arg(short, long)]
        iter: String,
        #[arg(short, long)]
        offset_sequence_id: i64,
    },
}

#[derive(Subcommand)]
enum ServerCommands {
    /// Run a single-node server
    Standalone(StandaloneArgs),
}

#[derive(Args)]
struct StandaloneArgs {
    /// Data directory for persistent storage
    #[arg(short, long, default_value = "/tmp/kuling")]
    data_dir: PathBuf,

    /// Soft cap for a segment file in bytes
    #[arg(long)]
    segment_max_bytes: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            command: ServerCommands::Standalone(args),
        } => run_standalone(&cli.address, args).await,
        Commands::Ping => {
            connect(&cli.address).await?.ping().await?;
            println!("PONG");
            Ok(())
        }
        Commands::Create { topic, num_shards } => {
            connect(&cli.address).await?.create(&topic, num_shards).await?;
            println!("OK");
            Ok(())
        }
        Commands::List => {
            let topics = connect(&cli.address).await?.list().await?;
            for topic in topics {
                println!("{topic}");
            }
            Ok(())
        }
        Commands::Describe { topic } => {
            let shards = connect(&cli.address).await?.describe(&topic).await?;
            println!("{shards}");
            Ok(())
        }
        Commands::Delete { topic } => {
            connect(&cli.address).await?.delete(&topic).await?;
            println!("OK");
            Ok(())
        }
        Commands::Put {
            topic,
            shard,
            key,
            message,
        } => {
            connect(&cli.address)
                .await?
                .put(&topic, &shard, key, message)
                .await?;
            println!("OK");
            Ok(())
        }
        Commands::Get {
            topic,
            shard,
            offset_sequence_id,
            max_num_messages,
        } => {
            let messages = connect(&cli.address)
                .await?
                .get(&topic, &shard, offset_sequence_id, max_num_messages)
                .await?;
            for m in messages {
                println!(
                    "{}: key: {} payload: {}",
                    m.sequence_id,
                    String::from_utf8_lossy(&m.key),
                    String::from_utf8_lossy(&m.payload),
                );
            }
            Ok(())
        }
        Commands::Iters {
            group,
            client,
            topic,
        } => {
            let iters = connect(&cli.address)
                .await?
                .iters(&group, &client, &topic)
                .await?;
            for iter in iters {
                println!("{iter}");
            }
            Ok(())
        }
        Commands::Commit {
            iter,
            offset_sequence_id,
        } => {
            connect(&cli.address)
                .await?
                .commit(&iter, offset_sequence_id)
                .await?;
            println!("OK");
            Ok(())
        }
    }
}

async fn connect(address: &str) -> Result<Client> {
    Client::connect(address)
        .await
        .with_context(|| format!("could not connect to kuling server at {address}"))
}

/// Open the stores, wire the broker, and serve until interrupted.
async fn run_standalone(address: &str, args: StandaloneArgs) -> Result<()> {
    let mut config = StoreConfig::default();
    if let Some(cap) = args.segment_max_bytes {
        config.segment_max_bytes = cap;
    }

    let logs = Arc::new(
        LogStore::open(&args.data_dir, config)
            .await
            .with_context(|| format!("could not open log store in {}", args.data_dir.display()))?,
    );
    let iters = Arc::new(
        RedbIterStore::open(args.data_dir.join(BROKER_DB))
            .context("could not open iterator store")?,
    );
    let broker = Arc::new(Broker::new(logs.clone(), iters));

    let server = Server::new(
        ServerConfig {
            bind_addr: address.to_string(),
        },
        logs.clone(),
        broker,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server_task = tokio::spawn(async move { server.run_until(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("could not install interrupt handler")?;
    info!("interrupt received, shutting down");

    let _ = shutdown_tx.send(());
    server_task.await??;

    // Flush every shard and wait for the close signal before exiting.
    let mut closed = logs.closed();
    logs.close().await?;
    closed
        .wait_for(|closed| *closed)
        .await
        .context("log store close signal dropped")?;

    info!("shutdown complete");
    Ok(())
}
