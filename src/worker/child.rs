//! Worker process entry point.
//!
//! The pool spawns the service binary with the hidden `worker`
//! subcommand, which lands here. The loop is deliberately dumb: read a
//! frame from stdin, convert, write a frame to stdout, repeat until the
//! parent closes the pipe. Everything unexpected — malformed frames,
//! converter errors, even converter panics — becomes a failure response
//! rather than a worker death, so one hostile document costs one request,
//! not a process.
//!
//! Stderr is inherited from the parent, so `tracing` output from here
//! interleaves with the service logs.

use std::io::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::proto::{self, WorkerResponse};
use crate::convert::convert_document;
use crate::types::ConversionRequest;

/// Run the worker loop until the parent closes stdin.
pub fn run_worker() -> io::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = stdin.lock();
    let mut writer = stdout.lock();

    tracing::debug!(pid = std::process::id(), "conversion worker ready");

    while let Some(frame) = proto::read_frame(&mut reader)? {
        let response = handle_frame(&frame);
        let body = serde_json::to_vec(&response)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        proto::write_frame(&mut writer, &body)?;
        writer.flush()?;
    }

    tracing::debug!(pid = std::process::id(), "conversion worker exiting");
    Ok(())
}

fn handle_frame(frame: &[u8]) -> WorkerResponse {
    let request: ConversionRequest = match serde_json::from_slice(frame) {
        Ok(request) => request,
        Err(e) => {
            return WorkerResponse::Failure {
                message: format!("malformed conversion request: {e}"),
            }
        }
    };

    match catch_unwind(AssertUnwindSafe(|| convert_document(&request))) {
        Ok(Ok(result)) => WorkerResponse::Success { result },
        Ok(Err(e)) => WorkerResponse::Failure {
            message: e.to_string(),
        },
        Err(panic) => WorkerResponse::Failure {
            message: format!("converter panicked: {}", panic_message(&panic)),
        },
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_for(request: &ConversionRequest) -> Vec<u8> {
        serde_json::to_vec(request).unwrap()
    }

    #[test]
    fn handles_valid_request() {
        let request = ConversionRequest {
            content: b"hello worker".to_vec(),
            filename: "note.txt".to_string(),
            keep_data_uris: false,
            extension: None,
            mimetype: None,
        };
        match handle_frame(&frame_for(&request)) {
            WorkerResponse::Success { result } => {
                assert!(result.markdown.contains("hello worker"));
            }
            WorkerResponse::Failure { message } => panic!("unexpected failure: {message}"),
        }
    }

    #[test]
    fn malformed_frame_becomes_failure() {
        match handle_frame(b"this is not json") {
            WorkerResponse::Failure { message } => {
                assert!(message.contains("malformed"), "got: {message}");
            }
            WorkerResponse::Success { .. } => panic!("expected failure"),
        }
    }

    #[test]
    fn converter_error_becomes_failure() {
        let request = ConversionRequest {
            content: b"%PDF-1.4".to_vec(),
            filename: "doc.pdf".to_string(),
            keep_data_uris: false,
            extension: None,
            mimetype: None,
        };
        match handle_frame(&frame_for(&request)) {
            WorkerResponse::Failure { message } => {
                assert!(message.contains("no converter"), "got: {message}");
            }
            WorkerResponse::Success { .. } => panic!("expected failure"),
        }
    }
}
