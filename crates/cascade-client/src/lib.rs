//! cascade-client — transfer agent and result writer internals.
//!
//! The binary wires these together; they are exposed as a library so the
//! integration tests can drive a real transfer over loopback.

pub mod agent;
pub mod writer;
