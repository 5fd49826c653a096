// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Batched UDP packet I/O for a QUIC-style transport.
//!
//! The crate converts raw socket primitives (batched receive, control
//! messages and segmented send) into [`ReceivedPacket`]s and provides a send
//! path that attaches GSO and ECN control messages.

#[macro_use]
mod macros;

pub mod buffer;
pub mod conn;
pub mod error;
pub mod features;
pub mod inet;
pub mod message;
pub mod probe;
pub mod socket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use buffer::{PacketBuffer, Pool};
pub use conn::{Capabilities, Conn, PacketInfo, ReceivedPacket};
pub use error::{Error, Result};
pub use features::Platform;
pub use inet::ExplicitCongestionNotification;
pub use socket::{options::Options, Socket};
