//! Workspace root package
//!
//! Exists to host the cross-crate integration tests in `tests/` and the
//! benchmark in `benches/`; all functionality lives in the `crates/*`
//! members.
