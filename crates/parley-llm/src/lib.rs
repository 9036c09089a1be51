// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider selection and usage-accounted chat.
//!
//! The [`AdapterFactory`] turns catalog records into wire-family adapters
//! and wraps each one in an [`AccountedProvider`] so every call is priced
//! and recorded. Message hygiene runs inside the wrapper, so callers hand
//! over raw agent memories as-is.

pub mod accounting;
pub mod factory;
pub mod hygiene;
pub mod tool_loop;

pub use accounting::AccountedProvider;
pub use factory::AdapterFactory;
pub use hygiene::sanitize_messages;
pub use tool_loop::{run_function_call, FunctionCallOutcome};
