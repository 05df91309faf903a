//! Shared test utilities for reposync integration tests.
//!
//! This module provides:
//! - `TestHarness`, an in-memory ledger plus a scripted source provider
//! - recording doubles for the notifier and the embedding trigger

pub mod harness;

pub use harness::{
    assert_processed_matches_rows, wait_for_status, RecordingEmbeddingTrigger, RecordingNotifier,
    TestHarness,
};
