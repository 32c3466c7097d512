// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value types and contracts shared by every learning component.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Patterns, queries, metrics, module and store contracts

pub mod pattern;
pub mod context;
pub mod performance;
pub mod filters;
pub mod module;
pub mod events;
pub mod repository;

pub use pattern::*;
pub use context::*;
pub use performance::*;
pub use filters::*;
pub use module::*;
pub use events::*;
pub use repository::*;
