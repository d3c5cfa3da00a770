//! Integration tests: target graph input through resolution to builds.

mod common;

mod packaging_tests;
mod resolve_tests;

#[cfg(unix)]
mod build_tests;
