//! Integration tests for the kiln binary.

#![cfg(unix)]

mod build_tests;
mod clean_tests;
mod common;
mod export_tests;
mod list_tests;
