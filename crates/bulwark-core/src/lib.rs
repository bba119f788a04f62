//! Bulwark Core - client-side request resilience
//!
//! Every network call of an administration console is routed through this
//! crate. It assigns timeouts per operation class, retries transient failures
//! with exponential backoff, manages a short-lived session token, reports
//! terminal failures on a typed event bus, keeps a TTL read cache and runs
//! bounded-concurrency batches with partial-failure semantics.
//!
//! # Main Components
//!
//! - **Dispatcher**: the single entry point for requests
//! - **RetryPolicy / execute_with_retry**: classify-then-backoff retry
//! - **TokenStore**: session token attachment and purging
//! - **EventBus**: typed publish/subscribe for terminal failures
//! - **ResponseCache**: in-memory TTL cache
//! - **BatchExecutor**: ordered, windowed batch execution
//!
//! # Example
//!
//! ```no_run
//! use bulwark_core::{BulwarkClient, ClientConfig, EventKind, RequestDescriptor};
//!
//! async fn example() -> bulwark_core::Result<()> {
//!     let client = BulwarkClient::new(ClientConfig::new("https://admin.example.com/api"))?;
//!     client.events().subscribe(EventKind::AuthLogout, |event| {
//!         eprintln!("signed out: {}", event.message());
//!     });
//!
//!     let measures = client
//!         .fetch_cached("measures", &RequestDescriptor::get("/measures"))
//!         .await?;
//!     println!("{}", measures);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cache;
pub mod cancel;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod http;

pub use batch::{BatchError, BatchExecutor, BatchItem, BatchOptions, BatchOutcome};
pub use cache::{CacheConfig, CacheEntry, CacheStats, ResponseCache};
pub use cancel::CancellationSignal;
pub use client::BulwarkClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use events::{EventBus, EventKind, ResilienceEvent, Subscription};
pub use http::{
    Dispatcher, ErrorKind, HttpMethod, RequestDescriptor, RequestError, RetryPolicy,
    SessionToken, TimeoutPolicy, TokenStore, Transport, TransportResponse,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
