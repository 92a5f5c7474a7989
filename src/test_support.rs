//! Shared helpers for the in-crate unit tests.

use parking_lot::Mutex;

/// Serializes tests that mutate process-global environment variables, so a
/// parallel test reading `PARTICIPA_*` never observes a half-applied
/// override.
pub static ENV_MUTEX: Mutex<()> = Mutex::new(());
