// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session websocket fan-out.

pub mod hub;

pub use hub::Hub;
