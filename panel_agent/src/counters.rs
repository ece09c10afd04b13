//! Last observed cumulative network counters, used to derive throughput.

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReading {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub captured_at: DateTime<Utc>,
}

/// Single slot owned by one sampler. Process lifetime only.
#[derive(Debug, Default)]
pub struct CounterStore {
    slot: Mutex<Option<CounterReading>>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    // The slot holds plain Copy data, so a poisoned guard is still consistent.
    fn guard(&self) -> MutexGuard<'_, Option<CounterReading>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `reading` and hand back whatever was there before, under one lock.
    pub fn exchange(&self, reading: CounterReading) -> Option<CounterReading> {
        self.guard().replace(reading)
    }

    /// Take a reading with `read` while holding the slot, store it, and
    /// return `(previous, current)`. Overlapping callers are serialized, so
    /// the stored baseline is always the newest reading.
    pub fn record<F>(&self, read: F) -> (Option<CounterReading>, CounterReading)
    where
        F: FnOnce() -> CounterReading,
    {
        let mut slot = self.guard();
        let current = read();
        (slot.replace(current), current)
    }

    pub fn last(&self) -> Option<CounterReading> {
        *self.guard()
    }

    pub fn reset(&self) {
        self.guard().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    fn reading(sent: u64, recv: u64, secs: i64) -> CounterReading {
        CounterReading {
            bytes_sent: sent,
            bytes_recv: recv,
            captured_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn first_exchange_returns_none_and_stores() {
        let store = CounterStore::new();
        assert_eq!(store.exchange(reading(10, 20, 100)), None);
        assert_eq!(store.last(), Some(reading(10, 20, 100)));
    }

    #[test]
    fn exchange_returns_previous_reading() {
        let store = CounterStore::new();
        store.exchange(reading(10, 20, 100));
        let prev = store.exchange(reading(30, 40, 101));
        assert_eq!(prev, Some(reading(10, 20, 100)));
        assert_eq!(store.last(), Some(reading(30, 40, 101)));
    }

    #[test]
    fn reset_clears_slot() {
        let store = CounterStore::new();
        store.exchange(reading(1, 1, 1));
        store.reset();
        assert_eq!(store.last(), None);
    }

    #[test]
    fn concurrent_exchanges_never_lose_the_chain() {
        // Every reading handed back must be one that some thread stored; with
        // N exchanges exactly one caller sees None.
        let store = Arc::new(CounterStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let s = Arc::clone(&store);
                std::thread::spawn(move || s.exchange(reading(i, i, i as i64)))
            })
            .collect();
        let prevs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(prevs.iter().filter(|p| p.is_none()).count(), 1);
        assert!(store.last().is_some());
    }

    #[test]
    fn concurrent_records_chain_in_reading_order() {
        // The counter advances inside `read`, so each caller must see the
        // reading taken immediately before its own.
        let store = Arc::new(CounterStore::new());
        let source = Arc::new(AtomicU64::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (s, src) = (Arc::clone(&store), Arc::clone(&source));
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| {
                            s.record(|| {
                                let n = src.fetch_add(1, Ordering::SeqCst) + 1;
                                CounterReading {
                                    bytes_sent: n,
                                    bytes_recv: n,
                                    captured_at: Utc::now(),
                                }
                            })
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for h in handles {
            for (prev, current) in h.join().unwrap() {
                match prev {
                    None => assert_eq!(current.bytes_sent, 1),
                    Some(p) => {
                        assert_eq!(p.bytes_sent + 1, current.bytes_sent);
                        assert!(p.captured_at <= current.captured_at);
                    }
                }
            }
        }
        assert_eq!(store.last().map(|r| r.bytes_sent), Some(400));
    }
}
