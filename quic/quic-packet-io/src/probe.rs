// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! One-time capability negotiation for a socket

use crate::{
    error::{Error, Feature, Result},
    features::{gso, Platform, Sockopt},
    inet::AddressFamily,
    socket::Socket,
};

/// Returns `true` if the socket accepts a GSO segment size
///
/// The option is reset to zero afterwards so sends without a segment size
/// record are not split.
#[inline]
pub fn probe_gso<S: Socket + ?Sized>(platform: &Platform, socket: &S) -> bool {
    let Some(option) = platform.gso.option.filter(|_| platform.gso.is_enabled()) else {
        tracing::debug!(platform = platform.name, "GSO not available");
        return false;
    };

    if let Err(err) = socket.set_option(option, gso::PROBE_SEGMENT_SIZE) {
        tracing::debug!(%err, "GSO probe rejected");
        return false;
    }

    if let Err(err) = socket.set_option(option, 0) {
        tracing::debug!(%err, "could not reset the GSO segment size");
    }

    tracing::debug!("GSO supported");
    true
}

/// Outcome of [`probe_receive_options`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiveOptions {
    pub ecn: bool,
    pub packet_info: bool,
}

/// Enables ECN and, if requested, packet info reporting on the socket
///
/// Each option is attempted for IPv4 and IPv6 independently and succeeding for
/// one family is enough. Failing for both families is an error. Features the
/// platform has no option for are reported as unsupported.
#[inline]
pub fn probe_receive_options<S: Socket + ?Sized>(
    platform: &Platform,
    socket: &S,
    ecn: bool,
    needs_packet_info: bool,
) -> Result<ReceiveOptions> {
    let mut result = ReceiveOptions::default();

    if ecn && platform.tos.is_complete() {
        result.ecn = enable(socket, Feature::Ecn, |family| platform.tos.option(family))?;
    } else {
        tracing::debug!(requested = ecn, "ECN not available");
    }

    if needs_packet_info {
        if platform.pktinfo.v4_record.is_some() || platform.pktinfo.v6_record.is_some() {
            result.packet_info = enable(socket, Feature::PacketInfo, |family| {
                platform.pktinfo.option(family)
            })?;
        } else {
            tracing::debug!("packet info not available");
        }
    }

    Ok(result)
}

#[inline]
fn enable<S: Socket + ?Sized>(
    socket: &S,
    feature: Feature,
    option: impl Fn(AddressFamily) -> Option<Sockopt>,
) -> Result<bool> {
    let mut last_error = None;
    let mut enabled = vec![];

    for family in [AddressFamily::V4, AddressFamily::V6] {
        let Some(option) = option(family) else {
            continue;
        };

        match socket.set_option(option, 1) {
            Ok(()) => enabled.push(family),
            Err(err) => {
                tracing::debug!(%feature, %family, %err, "could not enable reporting");
                last_error = Some(err);
            }
        }
    }

    if !enabled.is_empty() {
        tracing::debug!(%feature, families = ?enabled, "reporting enabled");
        return Ok(true);
    }

    match last_error {
        Some(source) => Err(Error::CapabilityProbe { feature, source }),
        // the table has no option for either family
        None => Ok(false),
    }
}
