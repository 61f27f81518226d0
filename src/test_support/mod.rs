//! Test-only helpers shared by unit test modules.

pub(crate) mod socket_guard;
