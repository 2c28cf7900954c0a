//! Kuling client library.
//!
//! A thin, typed mirror of the server's command table over one TCP
//! connection:
//!
//! ```ignore
//! use kuling_client::Client;
//!
//! let mut client = Client::connect("127.0.0.1:7777").await?;
//! client.create("orders", 4).await?;
//! client.put("orders", "0", "user-1", "payload").await?;
//! let messages = client.get("orders", "0", 1, 10).await?;
//! for m in messages {
//!     println!("{}: {:?}", m.sequence_id, m.payload);
//! }
//! ```

pub mod client;
pub mod error;

pub use client::Client;
pub use error::{Error, Result};
