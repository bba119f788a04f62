//! Command handlers for CLI subcommands

mod batch;
mod send;

pub use batch::handle_batch;
pub use send::handle_send;

use crate::config::Config;
use crate::error::Result;
use bulwark_core::{BulwarkClient, CancellationSignal, Subscription};
use tracing::{info, warn};

/// Build a client from the loaded configuration, logged in when a token was
/// supplied, with failure events routed to the log
fn connect(config: &Config, token: Option<&str>) -> Result<(BulwarkClient, Subscription)> {
    let client = BulwarkClient::new(config.client.clone())?;

    if let Some(token) = token {
        client.login_with_value(token, config.session.token_ttl_ms)?;
        info!(ttl_ms = config.session.token_ttl_ms, "Using session token");
    }

    let subscription = client.events().subscribe_all(|event| {
        warn!(
            kind = %event.kind(),
            status = ?event.status(),
            "{}",
            event.message()
        );
    });

    Ok((client, subscription))
}

/// A signal that fires on Ctrl-C
fn cancel_on_interrupt() -> CancellationSignal {
    let signal = CancellationSignal::new();
    let trigger = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight requests");
            trigger.cancel();
        }
    });
    signal
}
