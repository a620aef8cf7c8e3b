//! Shared helpers for integration tests.

pub mod fd_limit;
pub mod socket_guard;
