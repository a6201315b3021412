//! End-to-end tests for kiln-lib: build file, session, engine and state on disk.

#![cfg(unix)]

mod common;
mod engine_tests;
mod export_tests;
