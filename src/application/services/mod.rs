//! Application Services
//!
//! Orchestration services coordinating the domain with the ports.
//!
//! - [`collector`]: per-exchange sessions, the dynamic subscription set,
//!   and the shared per-tick callback pipeline
//! - [`daemon`]: top-level lifecycle, the three-valued admission check,
//!   and the health surface

pub mod collector;
pub mod daemon;
