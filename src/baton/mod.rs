// SPDX-License-Identifier: MIT

pub mod checkpoint;
pub mod declarative;
pub mod handoff;
pub mod registry;
pub mod server;
pub mod workflow;
