//! Produce a handful of messages to a running Kuling server.
//!
//! Start a server first:
//!
//! ```bash
//! kuling server standalone --address 127.0.0.1:7777 --data-dir /tmp/kuling-demo
//! ```
//!
//! Then:
//!
//! ```bash
//! KULING_ADDR=127.0.0.1:7777 cargo run -p kuling-client --example simple_producer
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
    let mut client = Client::connect(addr.as_str()).await?;

    // Idempotent-ish setup: creating an existing topic is an error we can
    // ignore for a demo.
    if let Err(err) = client.create("orders", 4).await {
        println!("create skipped: {err}");
    }

    for i in 0..10 {
        let shard = (i % 4).to_string();
        client
            .put(
                "orders",
                &shard,
                format!("user-{}", i % 3),
                format!(r#"{{"order": {i}, "amount": {}}}"#, 10 + i),
            )
            .await?;
        println!("produced order {i} to shard {shard}");
    }

    println!("done; topics now: {:?}", client.list().await?);
    Ok(())
}
