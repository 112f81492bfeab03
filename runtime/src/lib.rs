// Copyright 2026 Lead Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Lead Harvest runtime — Chromium driver and CLI for the harvesting engine.
//!
//! This library crate exposes the driver and subcommands for the binary and
//! for integration testing.

pub mod cli;
pub mod renderer;
