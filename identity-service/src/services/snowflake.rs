//! 64-bit time-ordered identifiers.
//!
//! Layout: `(millis since EPOCH) << 22 | instance << 12 | sequence`.
//! The last timestamp and sequence share one `AtomicU64`, so a single compare-and-swap
//! claims an id and concurrent callers never hand out the same value.

use std::hint;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// 2008-04-01T00:00:00Z in unix milliseconds.
pub const EPOCH_MILLIS: u64 = 1_207_008_000_000;

const INSTANCE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
pub const MAX_INSTANCE_ID: u16 = (1 << INSTANCE_BITS) - 1;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnowflakeError {
    #[error("instance id {0} does not fit in 10 bits (max 1023)")]
    InstanceOutOfRange(u32),
}

#[derive(Debug)]
pub struct SnowflakeGenerator {
    instance_id: u64,
    /// `last_millis << SEQUENCE_BITS | sequence`.
    state: AtomicU64,
}

impl SnowflakeGenerator {
    pub fn new(instance_id: u32) -> Result<Self, SnowflakeError> {
        if instance_id > MAX_INSTANCE_ID as u32 {
            return Err(SnowflakeError::InstanceOutOfRange(instance_id));
        }
        Ok(Self {
            instance_id: instance_id as u64,
            state: AtomicU64::new(0),
        })
    }

    pub fn instance_id(&self) -> u16 {
        self.instance_id as u16
    }

    /// Next id. Spins until the next millisecond once 4096 ids were issued in the current one.
    pub fn next_id(&self) -> i64 {
        loop {
            let now = current_millis();
            let prev = self.state.load(Ordering::Acquire);
            let last = prev >> SEQUENCE_BITS;
            let sequence = prev & MAX_SEQUENCE;

            let next = if now > last {
                now << SEQUENCE_BITS
            } else if sequence < MAX_SEQUENCE {
                // Same millisecond, or the wall clock stepped back: stay on `last`.
                prev + 1
            } else {
                hint::spin_loop();
                continue;
            };

            if self
                .state
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return self.compose(next >> SEQUENCE_BITS, next & MAX_SEQUENCE);
            }
        }
    }

    fn compose(&self, millis: u64, sequence: u64) -> i64 {
        let elapsed = millis.saturating_sub(EPOCH_MILLIS);
        ((elapsed << (INSTANCE_BITS + SEQUENCE_BITS))
            | (self.instance_id << SEQUENCE_BITS)
            | sequence) as i64
    }
}

/// Split an id into (unix millis, instance, sequence).
pub fn decompose(id: i64) -> (u64, u16, u16) {
    let id = id as u64;
    let millis = (id >> (INSTANCE_BITS + SEQUENCE_BITS)) + EPOCH_MILLIS;
    let instance = ((id >> SEQUENCE_BITS) & MAX_INSTANCE_ID as u64) as u16;
    let sequence = (id & MAX_SEQUENCE) as u16;
    (millis, instance, sequence)
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn rejects_instance_ids_past_ten_bits() {
        assert!(SnowflakeGenerator::new(1023).is_ok());
        assert_eq!(
            SnowflakeGenerator::new(1024).unwrap_err(),
            SnowflakeError::InstanceOutOfRange(1024)
        );
    }

    #[test]
    fn layout_round_trips() {
        let generator = SnowflakeGenerator::new(513).unwrap();
        let before = current_millis();
        let id = generator.next_id();
        let after = current_millis();

        let (millis, instance, _) = decompose(id);
        assert_eq!(instance, 513);
        assert!(millis >= before && millis <= after);
        assert!(id > 0);
    }

    #[test]
    fn strictly_increasing_on_one_thread() {
        // Enough ids to overflow the 12-bit sequence several times.
        let generator = SnowflakeGenerator::new(1).unwrap();
        let mut last = generator.next_id();
        for _ in 0..20_000 {
            let id = generator.next_id();
            assert!(id > last, "{id} <= {last}");
            last = id;
        }
    }

    #[test]
    fn unique_under_concurrency() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 12_500;

        let generator = Arc::new(SnowflakeGenerator::new(7).unwrap());
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    let mut ids = Vec::with_capacity(PER_THREAD);
                    for _ in 0..PER_THREAD {
                        ids.push(generator.next_id());
                    }
                    ids
                })
            })
            .collect();

        let mut seen = HashSet::with_capacity(THREADS * PER_THREAD);
        for handle in handles {
            let ids = handle.join().unwrap();
            // Per-thread order is generation order.
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), THREADS * PER_THREAD);
    }

    #[test]
    fn later_calls_compare_greater_across_threads() {
        let generator = Arc::new(SnowflakeGenerator::new(3).unwrap());
        let first = generator.next_id();
        let other = {
            let generator = Arc::clone(&generator);
            std::thread::spawn(move || generator.next_id()).join().unwrap()
        };
        assert!(other > first);
    }
}
