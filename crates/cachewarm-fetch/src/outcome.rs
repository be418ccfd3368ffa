use std::borrow::Cow;
use std::time::Instant;

use crate::error::FetchError;

/// Uniform result of one fetch attempt.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// `true` only for a 2xx response with no transport error.
    pub ok: bool,
    /// HTTP status, `0` when the remote was never reached.
    pub status_code: u16,
    pub body: Vec<u8>,
    pub error: Option<FetchError>,
    pub duration_ms: u64,
}

impl FetchOutcome {
    pub(crate) fn transport(reason: impl Into<String>, started: Instant) -> Self {
        Self {
            ok: false,
            status_code: 0,
            body: Vec::new(),
            error: Some(FetchError::Transport(reason.into())),
            duration_ms: elapsed_ms(started),
        }
    }

    pub(crate) fn response(status_code: u16, body: Vec<u8>, started: Instant) -> Self {
        let ok = (200..300).contains(&status_code);
        Self {
            ok,
            status_code,
            body,
            error: (!ok).then_some(FetchError::HttpStatus {
                status: status_code,
            }),
            duration_ms: elapsed_ms(started),
        }
    }

    /// Body as text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
