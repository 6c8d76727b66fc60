// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

use thiserror::Error;

use super::ConfigError;
use crate::proto::CodecError;

/// Failures talking to a remote stage.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Retry budget exhausted against a literal endpoint.
    #[error("could not connect to service at {host}:{port} after {attempts} attempt(s)")]
    ConnectionFailed {
        host: String,
        port: u16,
        attempts: u32,
    },

    /// Retry budget exhausted against a named service.
    #[error("could not connect to service '{service}' after {attempts} attempt(s)")]
    ServiceUnavailable { service: String, attempts: u32 },

    /// No channel is open, either never connected or closed after a failure.
    #[error("proxy is not connected")]
    NotConnected,

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] CodecError),

    #[error("connection closed by peer")]
    ConnectionLost,

    /// The service answered with an embedded error field.
    #[error("service reported error: {0}")]
    Remote(String),

    #[error("service does not support command '{0}'")]
    UnknownCommand(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        ServiceError::Transport(CodecError::Io(e))
    }
}

impl ServiceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout(_))
    }

    /// True for failures that leave the proxy without a usable channel.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ServiceError::ConnectionFailed { .. }
                | ServiceError::ServiceUnavailable { .. }
                | ServiceError::NotConnected
                | ServiceError::Timeout(_)
                | ServiceError::Transport(_)
                | ServiceError::ConnectionLost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(ServiceError::Timeout(Duration::from_millis(5)).is_timeout());
        assert!(ServiceError::Timeout(Duration::from_millis(5)).is_connection());
        assert!(ServiceError::NotConnected.is_connection());
        assert!(!ServiceError::Remote("boom".into()).is_connection());
        assert!(!ServiceError::UnknownCommand("Annotate".into()).is_timeout());
    }

    #[test]
    fn connection_failed_names_endpoint() {
        let err = ServiceError::ConnectionFailed {
            host: "localhost".into(),
            port: 9500,
            attempts: 3,
        };
        assert!(err.to_string().contains("localhost:9500"));
    }
}
