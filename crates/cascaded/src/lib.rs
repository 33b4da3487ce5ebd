//! cascaded — cascade dataset server internals.
//!
//! The binary wires these together; they are exposed as a library so the
//! integration tests can drive a real coordinator over loopback.

pub mod coordinator;
pub mod generator;
