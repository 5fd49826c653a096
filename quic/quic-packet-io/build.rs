// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

fn main() {
    // allow overriding the detected features with an env variable
    if let Some(features) = option_env("QUIC_PACKET_IO_FEATURES_OVERRIDE") {
        for feature in features.split(',').map(str::trim) {
            if !feature.is_empty() {
                supports(feature);
            }
        }
        return;
    }

    let target_os = env("CARGO_CFG_TARGET_OS");

    match target_os.as_str() {
        "linux" => {
            supports("gso");
            supports("mmsg");
            supports("pktinfo");
            supports("tos");
        }
        "android" => {
            supports("mmsg");
            supports("pktinfo");
            supports("tos");
        }
        "macos" | "ios" => {
            supports("pktinfo");
            supports("tos");
        }
        "windows" => {
            // the tables are available for encoding/decoding but no socket
            // implementation is provided
            supports("gso");
            supports("pktinfo");
            supports("tos");
        }
        _ => {
            // everything stays disabled
        }
    }
}

fn supports(name: &str) {
    println!("cargo:rustc-cfg=quic_packet_io_{name}");
}

fn env(name: &str) -> String {
    option_env(name).unwrap_or_else(|| panic!("build script missing {name:?} environment variable"))
}

fn option_env(name: &str) -> Option<String> {
    println!("cargo:rerun-if-env-changed={name}");
    std::env::var(name).ok()
}
