//! Output writing
//!
//! Response bodies and batch outcomes go to stdout as JSON. Status lines go
//! to stderr and are suppressed by `--quiet`.

use crate::error::Result;
use crate::logging::redaction;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use is_terminal::IsTerminal;
use serde::Serialize;
use std::io::{self, Write};
use std::time::Duration;
use tracing::trace;

pub struct OutputWriter {
    pretty: bool,
    use_color: bool,
    quiet: bool,
    show_progress: bool,
    data: Box<dyn Write>,
    status: Box<dyn Write>,
}

impl OutputWriter {
    pub fn new(pretty: bool, use_color: bool, quiet: bool) -> Self {
        Self {
            pretty,
            use_color,
            quiet,
            show_progress: !quiet && io::stderr().is_terminal(),
            data: Box::new(io::stdout()),
            status: Box::new(io::stderr()),
        }
    }

    /// Create an output writer over custom sinks
    pub fn with_writers(
        pretty: bool,
        quiet: bool,
        data: Box<dyn Write>,
        status: Box<dyn Write>,
    ) -> Self {
        Self {
            pretty,
            use_color: false,
            quiet,
            show_progress: false,
            data,
            status,
        }
    }

    /// Write a JSON document to the data sink
    pub fn data<T: Serialize>(&mut self, value: &T) -> Result<()> {
        if tracing::enabled!(tracing::Level::TRACE) {
            let mut redacted = serde_json::to_value(value)?;
            redaction::redact_json_value(&mut redacted);
            trace!(data = %redacted, "Writing output");
        }

        let formatted = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        writeln!(self.data, "{}", formatted)?;
        self.data.flush()?;
        Ok(())
    }

    pub fn info(&mut self, message: &str) -> Result<()> {
        if self.quiet {
            return Ok(());
        }
        let line = if self.use_color {
            format!("{} {}", "ℹ".blue(), message)
        } else {
            format!("INFO: {}", message)
        };
        self.status_line(&line)
    }

    pub fn success(&mut self, message: &str) -> Result<()> {
        if self.quiet {
            return Ok(());
        }
        let line = if self.use_color {
            message.green().to_string()
        } else {
            message.to_string()
        };
        self.status_line(&line)
    }

    /// Warnings are shown even in quiet mode
    pub fn warning(&mut self, message: &str) -> Result<()> {
        let line = if self.use_color {
            message.yellow().to_string()
        } else {
            format!("WARNING: {}", message)
        };
        self.status_line(&line)
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(&self, message: &str) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    }

    fn status_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.status, "{}", line)?;
        self.status.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Sink {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_compact_and_pretty_data() {
        let data = Sink::default();
        let mut output = OutputWriter::with_writers(
            false,
            false,
            Box::new(data.clone()),
            Box::new(Sink::default()),
        );
        output.data(&json!({"id": 1})).unwrap();
        assert_eq!(data.contents(), "{\"id\":1}\n");

        let data = Sink::default();
        let mut output = OutputWriter::with_writers(
            true,
            false,
            Box::new(data.clone()),
            Box::new(Sink::default()),
        );
        output.data(&json!({"id": 1})).unwrap();
        assert_eq!(data.contents(), "{\n  \"id\": 1\n}\n");
    }

    #[test]
    fn test_quiet_suppresses_status_but_not_warnings() {
        let status = Sink::default();
        let mut output = OutputWriter::with_writers(
            false,
            true,
            Box::new(Sink::default()),
            Box::new(status.clone()),
        );

        output.info("sending").unwrap();
        output.success("done").unwrap();
        output.warning("2 of 5 requests failed").unwrap();

        assert_eq!(status.contents(), "WARNING: 2 of 5 requests failed\n");
        assert!(output.spinner("working").is_none());
    }
}
