//! Batch command handler

use crate::cli::BatchArgs;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::OutputWriter;
use bulwark_core::{BatchOptions, RequestDescriptor};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, instrument};

/// Accepted batch file layouts
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Requests(Vec<RequestDescriptor>),
    Document {
        requests: Vec<RequestDescriptor>,
        #[serde(default)]
        options: Option<BatchOptions>,
    },
}

/// Handle the batch command
#[instrument(skip_all, fields(file = %args.file.display()))]
pub async fn handle_batch(
    args: BatchArgs,
    config: &Config,
    token: Option<&str>,
    output: &mut OutputWriter,
) -> Result<()> {
    let (requests, file_options) = load_batch_file(&args.file)?;
    let options = merge_options(
        file_options.unwrap_or_else(|| config.client.batch.clone()),
        &args,
    );
    options.validate()?;

    info!(
        requests = requests.len(),
        concurrency = options.concurrency,
        fail_fast = options.fail_fast,
        "Running batch"
    );

    let (client, _events) = super::connect(config, token)?;
    let cancel = super::cancel_on_interrupt();

    output.info(&format!(
        "Running {} requests, {} at a time",
        requests.len(),
        options.concurrency
    ))?;
    let spinner = output.spinner("Waiting for responses...");
    let result = client
        .run_batch_with(&requests, &options, Some(&cancel))
        .await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let outcome = result?;
    output.data(&outcome)?;

    let total = outcome.results.len();
    if outcome.is_complete_success() {
        output.success(&format!("✓ {} of {} requests succeeded", total, total))?;
        Ok(())
    } else {
        let failed = outcome.errors.len();
        output.warning(&format!("✗ {} of {} requests failed", failed, total))?;
        Err(Error::other(format!("{} batch request(s) failed", failed)))
    }
}

/// Read a batch file: either a bare array of requests or an object with
/// `requests` and optional `options`
pub(crate) fn load_batch_file(
    path: &Path,
) -> Result<(Vec<RequestDescriptor>, Option<BatchOptions>)> {
    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path)?;
    let parsed: BatchFile = serde_json::from_str(&content).map_err(|_| Error::InvalidFormat {
        path: path.to_path_buf(),
        expected: "JSON request array or {\"requests\": [...]}".to_string(),
    })?;

    let (requests, options) = match parsed {
        BatchFile::Requests(requests) => (requests, None),
        BatchFile::Document { requests, options } => (requests, options),
    };

    for (index, request) in requests.iter().enumerate() {
        request
            .validate()
            .map_err(|e| Error::invalid_args(format!("Request {} is invalid: {}", index, e)))?;
    }

    Ok((requests, options))
}

/// Command-line flags win over file and config options
fn merge_options(mut options: BatchOptions, args: &BatchArgs) -> BatchOptions {
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency;
    }
    if args.fail_fast {
        options.fail_fast = true;
    }
    if args.no_retry {
        options.retry_failures = false;
    }
    options
}
