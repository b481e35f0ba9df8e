// SPDX-License-Identifier: MIT

//! Agent development kit: the capabilities the engine consumes.

pub mod agent;
pub mod error;
pub mod message;
pub mod retry;
pub mod tool;
