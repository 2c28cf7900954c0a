//! Consume a topic as a member of a consumer group.
//!
//! Joins group `demo` as a named client, fetches a batch from every shard
//! the group assigns to it, and commits the new offsets. Run several
//! instances with different `CLIENT` names to watch shards move between
//! them.
//!
//! ```bash
//! KULING_ADDR=127.0.0.1:7777 CLIENT=worker-1 \
//!     cargo run -p kuling-client --example group_consumer
//! ```

use kuling_client::Client;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr = std::env::var("KULING_ADDR").unwrap_or_else(|_| "127.0.0.1:7777".to_string());
    let name = std::env::var("CLIENT").unwrap_or_else(|_| "worker-1".to_string());
    let mut client = Client::connect(addr.as_str()).await?;

    let iters = client.iters("demo", &name, "orders").await?;
    println!("{name} owns {} shard(s)", iters.len());

    for iter in iters {
        let parsed: kuling_core::Iter = iter.parse()?;
        let start = parsed.offset + 1;

        let messages = client.get("orders", &parsed.shard, start, 100).await;
        let messages = match messages {
            Ok(messages) => messages,
            Err(err) => {
                // An offset at the shard's head has nothing to read yet.
                println!("shard {}: nothing to read ({err})", parsed.shard);
                continue;
            }
        };

        for m in &messages {
            println!(
                "shard {} seq {}: key={} payload={}",
                parsed.shard,
                m.sequence_id,
                String::from_utf8_lossy(&m.key),
                String::from_utf8_lossy(&m.payload),
            );
        }

        if let Some(last) = messages.last() {
            client.commit(&parsed.id(), last.sequence_id).await?;
            println!("shard {}: committed offset {}", parsed.shard, last.sequence_id);
        }
    }

    Ok(())
}
