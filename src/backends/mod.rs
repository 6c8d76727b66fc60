// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod local;
pub mod process;
pub mod remote;

#[cfg(test)]
pub mod stub;
