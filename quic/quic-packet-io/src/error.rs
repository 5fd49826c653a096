// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::message::cmsg::DecodeError;
use core::fmt;
use std::io;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The socket reported end of stream
    #[error("the socket was closed")]
    Closed,
    /// A received datagram carried a malformed control message chain
    #[error("invalid control message: {0}")]
    InvalidControlMessage(#[from] DecodeError),
    /// Enabling a receive option failed for every address family
    #[error("could not enable {feature} reporting: {source}")]
    CapabilityProbe {
        feature: Feature,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns `true` if the error is transient and the operation can be retried
    #[inline]
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::Io(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted))
    }
}

/// A socket capability that is enabled at construction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    Ecn,
    PacketInfo,
    Gso,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ecn => f.write_str("ECN"),
            Self::PacketInfo => f.write_str("packet info"),
            Self::Gso => f.write_str("GSO"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let err = Error::CapabilityProbe {
            feature: Feature::Ecn,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().starts_with("could not enable ECN reporting"));

        let err: Error = DecodeError::Truncated { remaining: 3 }.into();
        assert!(matches!(err, Error::InvalidControlMessage(_)));

        let err: Error = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert!(err.is_would_block());
        assert!(!Error::Closed.is_would_block());
    }
}
