//! mnemo - dual-tier agent memory with a reflection scheduler
//!
//! The engine lives in the `mnemo-*` crates; this package adds prompt
//! formatting helpers and the `mnemo` inspector binary.

pub mod format;
