//! Send command handler

use crate::cli::SendArgs;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::redaction;
use crate::output::OutputWriter;
use bulwark_core::{HttpMethod, RequestDescriptor};
use std::str::FromStr;
use tracing::{debug, instrument};

/// Handle the send command
#[instrument(skip_all, fields(method = %args.method, path = %args.path))]
pub async fn handle_send(
    args: SendArgs,
    config: &Config,
    token: Option<&str>,
    output: &mut OutputWriter,
) -> Result<()> {
    let request = build_request(&args)?;

    if let Some(body) = &request.body {
        let mut redacted = body.clone();
        redaction::redact_json_value(&mut redacted);
        debug!(body = %redacted, "Request body");
    }

    let (client, _events) = super::connect(config, token)?;
    let cancel = super::cancel_on_interrupt();

    let spinner = output.spinner(&format!("{} {}", request.method, request.path));
    let result = client.send_with_cancel(&request, &cancel).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let body = result?;
    output.data(&body)
}

/// Turn command-line arguments into a request descriptor
pub(crate) fn build_request(args: &SendArgs) -> Result<RequestDescriptor> {
    let method = HttpMethod::from_str(&args.method)?;
    let mut request = RequestDescriptor::new(method, args.path.clone());

    if let Some(raw) = &args.body {
        let body = serde_json::from_str(raw)
            .map_err(|e| Error::invalid_args(format!("--body is not valid JSON: {}", e)))?;
        request = request.with_body(body);
    }

    for header in &args.headers {
        let (name, value) = parse_header(header)?;
        request = request.with_header(name, value);
    }

    if let Some(timeout_ms) = args.timeout_ms {
        request = request.with_timeout_ms(timeout_ms);
    }

    request.validate()?;
    Ok(request)
}

fn parse_header(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => Err(Error::invalid_args(format!(
            "Header must be NAME:VALUE, got {:?}",
            raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::ErrorKind;
    use serde_json::json;

    fn args(method: &str, path: &str) -> SendArgs {
        SendArgs {
            method: method.to_string(),
            path: path.to_string(),
            body: None,
            timeout_ms: None,
            headers: Vec::new(),
        }
    }

    #[test]
    fn test_build_request() {
        let mut send = args("patch", "/products/7/toggle");
        send.body = Some(r#"{"active": false}"#.to_string());
        send.headers = vec!["X-Trace: abc".to_string()];
        send.timeout_ms = Some(2_500);

        let request = build_request(&send).unwrap();
        assert_eq!(request.method, HttpMethod::Patch);
        assert_eq!(request.body, Some(json!({"active": false})));
        assert_eq!(request.header("X-Trace"), Some("abc"));
        assert_eq!(request.explicit_timeout_ms, Some(2_500));
    }

    #[test]
    fn test_unknown_method_is_validation_error() {
        match build_request(&args("TRACE", "/products")) {
            Err(Error::Request(e)) => assert_eq!(e.kind, ErrorKind::Validation),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_bad_body_and_header() {
        let mut send = args("POST", "/products");
        send.body = Some("{not json".to_string());
        assert!(matches!(build_request(&send), Err(Error::InvalidArgs(_))));

        let mut send = args("GET", "/products");
        send.headers = vec!["no-colon".to_string()];
        assert!(matches!(build_request(&send), Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn test_relative_path_required() {
        assert!(build_request(&args("GET", "products")).is_err());
    }
}
