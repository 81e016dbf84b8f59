//! Unique id generation
//!
//! Subscription ids, request correlation ids and (typically) reply
//! destinations are all unique tokens. The client takes its generator as a
//! collaborator so tests can make ids predictable.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of unique tokens
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random 128-bit ids rendered as 32 lowercase hex digits
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> String {
        generate_id()
    }
}

/// Deterministic ids: `<prefix><counter as 8 hex digits>`
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}{:08x}", self.prefix, n)
    }
}

/// Generate a fresh random id
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
