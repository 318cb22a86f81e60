//! Integration test entry point for mfsprobe.
//!
//! Every test runs its own fake masters on ephemeral 127.0.0.1 ports.
//! Run with: cargo test --test integration

mod harness;
mod admin;
mod dispatcher;
mod resolver;
