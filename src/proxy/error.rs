//! Error kinds of the validation engine

use thiserror::Error;

/// Why a single probe failed. Always local to one job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("dial error: {0}")]
    Dial(String),

    /// SOCKS4 reply code other than 0x5A
    #[error("SOCKS4 request failed with code: {0}")]
    Handshake(u8),

    #[error("proxy protocol error: {0}")]
    ProxyProtocol(String),

    #[error("status code: {0}")]
    HttpStatus(u16),

    #[error("SOCKS4 only supports IPv4, {0} has no IPv4 address")]
    Ipv4Unsupported(String),

    #[error("unknown protocol: {0}")]
    UnsupportedProtocol(String),

    /// Failure after the connection existed (TLS, malformed response, ...)
    #[error("request error: {0}")]
    Request(String),
}

/// Run-level failures surfaced to the caller
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("failed to write valid proxy to sink: {0}")]
    SinkWrite(#[from] std::io::Error),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Dial(format!("timed out: {err}"))
        } else if err.is_connect() {
            ProbeError::Dial(err.to_string())
        } else {
            ProbeError::Request(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_error_keeps_code() {
        let err = ProbeError::Handshake(0x5B);
        assert_eq!(err.to_string(), "SOCKS4 request failed with code: 91");
    }

    #[test]
    fn test_status_error_message() {
        assert_eq!(ProbeError::HttpStatus(503).to_string(), "status code: 503");
    }
}
