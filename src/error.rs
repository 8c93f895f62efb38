// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types shared by the codec, controller and coordinator.

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::ProtocolId;

/// Everything that can go wrong talking to a bed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BedError {
    /// Link could not be established within the attempt ceiling.
    #[error("Connection to {address} failed after {attempts} attempt(s): {reason}")]
    ConnectionFailure {
        address: String,
        attempts: u32,
        reason: String,
    },

    /// A single write did not complete in time. The session survives.
    #[error("Write to {characteristic} timed out")]
    WriteTimeout { characteristic: Uuid },

    /// Notification payload was malformed or too short.
    #[error("Decode failure: {0}")]
    DecodeFailure(String),

    /// The bound protocol has no encoding for this operation.
    #[error("{protocol} does not support {capability}")]
    UnsupportedCapability {
        protocol: ProtocolId,
        capability: &'static str,
    },

    /// Inbound checksum did not match.
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// The protocol is PIN-gated and no PIN is configured.
    #[error("{protocol} requires a PIN before it accepts commands")]
    AuthenticationRequired { protocol: ProtocolId },

    /// Several families share the advertised identifiers.
    #[error("Ambiguous protocol, candidates: {candidates:?}")]
    AmbiguousProtocol { candidates: Vec<ProtocolId> },

    /// Protocol identifier is not in the registry.
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// Caller supplied a command the protocol cannot express as given.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// No link is available and none could be requested.
    #[error("Not connected")]
    NotConnected,

    /// Opaque failure from the platform link service.
    #[error("Link error: {0}")]
    Link(String),
}

/// Result type alias using [`BedError`].
pub type Result<T> = std::result::Result<T, BedError>;

impl BedError {
    /// Creates a new link error
    pub fn link(msg: impl Into<String>) -> Self {
        BedError::Link(msg.into())
    }

    /// Creates a new decode failure
    pub fn decode(msg: impl Into<String>) -> Self {
        BedError::DecodeFailure(msg.into())
    }

    /// Creates a new invalid command error
    pub fn invalid(msg: impl Into<String>) -> Self {
        BedError::InvalidCommand(msg.into())
    }

    /// Errors the coordinator may retry on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BedError::ConnectionFailure { .. } | BedError::WriteTimeout { .. } | BedError::Link(_)
        )
    }

    /// Checksum mismatches are reported the same way as malformed payloads.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            BedError::DecodeFailure(_) | BedError::ChecksumMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_mismatch_counts_as_decode_failure() {
        let err = BedError::ChecksumMismatch {
            expected: 0x12,
            actual: 0x34,
        };
        assert!(err.is_decode_failure());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Checksum mismatch: expected 0x12, got 0x34");
    }

    #[test]
    fn test_transient_classification() {
        assert!(BedError::WriteTimeout {
            characteristic: Uuid::nil()
        }
        .is_transient());
        assert!(BedError::link("gone").is_transient());
        assert!(!BedError::invalid("slot 9").is_transient());
        assert!(!BedError::AuthenticationRequired {
            protocol: ProtocolId::Octo
        }
        .is_transient());
    }
}
