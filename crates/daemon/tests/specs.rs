//! Behavioral specifications for the keeld binary.
//!
//! These tests are black-box: they invoke the daemon binary and verify
//! stdout, stderr, and exit codes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/cli.rs"]
mod cli;
#[path = "specs/restore.rs"]
mod restore;
#[path = "specs/run.rs"]
mod run;
