// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// Returns early with `$otherwise` if the condition is not met
macro_rules! ensure {
    ($cond:expr, $otherwise:expr) => {
        if !($cond) {
            return $otherwise;
        }
    };
    ($cond:expr) => {
        ensure!($cond, ())
    };
}
