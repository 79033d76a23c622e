//! Module system tests
//!
//! Tests for unit loading, module discovery, configuration overlay, and
//! composition of service registrations.

pub mod test_utils;
mod catalog_tests;
mod composition_tests;
mod loader_tests;
