// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{buffer, features::Platform};

/// Number of datagrams received per batch
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Environment variable that disables GSO when set to a non-empty value other than `0`/`false`
pub const DISABLE_GSO_ENV: &str = "QUIC_IO_DISABLE_GSO";
/// Environment variable that disables ECN when set to a non-empty value other than `0`/`false`
pub const DISABLE_ECN_ENV: &str = "QUIC_IO_DISABLE_ECN";

#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct Options {
    /// Whether the socket sets the don't-fragment bit, as determined by the caller
    pub supports_df: bool,
    /// Probe and use GSO if the platform supports it
    pub gso: bool,
    /// Enable ECN reporting and marking if the platform supports it
    pub ecn: bool,
    pub batch_size: usize,
    pub max_packet_size: usize,
    /// Number of released buffers kept for reuse
    pub pool_max_idle: usize,
    pub platform: &'static Platform,
}

impl Default for Options {
    #[inline]
    fn default() -> Self {
        Self {
            supports_df: false,
            gso: true,
            ecn: true,
            batch_size: DEFAULT_BATCH_SIZE,
            max_packet_size: buffer::DEFAULT_MAX_PACKET_SIZE,
            pool_max_idle: buffer::DEFAULT_MAX_IDLE,
            platform: &Platform::NATIVE,
        }
    }
}

impl Options {
    #[inline]
    pub fn new(supports_df: bool) -> Self {
        Self {
            supports_df,
            ..Default::default()
        }
    }

    /// Applies the `QUIC_IO_DISABLE_*` overrides from the environment
    #[inline]
    pub fn from_env(supports_df: bool) -> Self {
        Self::new(supports_df).with_env(|name| std::env::var(name).ok())
    }

    #[inline]
    fn with_env(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
        if is_set(get(DISABLE_GSO_ENV)) {
            tracing::debug!("GSO disabled by {DISABLE_GSO_ENV}");
            self.gso = false;
        }
        if is_set(get(DISABLE_ECN_ENV)) {
            tracing::debug!("ECN disabled by {DISABLE_ECN_ENV}");
            self.ecn = false;
        }
        self
    }
}

#[inline]
fn is_set(value: Option<String>) -> bool {
    match value.as_deref().map(str::trim) {
        None | Some("") | Some("0") => false,
        Some(value) => !value.eq_ignore_ascii_case("false"),
    }
}
