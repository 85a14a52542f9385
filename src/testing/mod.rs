//! Test-only support code: deterministic keys, an in-memory [`Chain`],
//! crypto providers, and the fixed fixtures `spec.md` §8's scenarios are
//! built from.
//!
//! Mirrors the teacher's `src/test/` tree (`mem_validator.rs`,
//! `in_mem_state.rs`, `test_validator.rs`) — kept here as a single nested
//! module tree since this crate is one crate, not the teacher's workspace
//! (`SPEC_FULL.md` §A.4).

pub mod chain;
pub mod crypto;
pub mod fixtures;
pub mod keys;
