use dashmap::DashMap;

cfg_not_loom! {
    use std::sync::atomic::{AtomicU64, Ordering};
}

cfg_loom! {
    use loom::sync::atomic::{AtomicU64, Ordering};
}

const STREAM_ID_MASK: u64 = 0x7FFF_FFFF;

/// The counter value above which `next()` no longer reports `first_cycle`.
///
/// While the underlying counter is at or below this value, every masked stream ID handed out is
/// guaranteed unique within the connection's lifetime: the masked space has 2^31 values and we
/// haven't yet used half of them.
const FIRST_CYCLE_CEILING: u64 = 1 << 30;

/// Thread safe, parity-based stream ID allocator.
///
/// Client instances yield 1, 3, 5, …; server instances yield 2, 4, 6, …. Both mask their
/// internal counter down to 31 bits and skip the value `0`, which is reserved for
/// connection-level frames.
#[derive(Debug)]
pub struct StreamIdProvider(AtomicU64);

impl StreamIdProvider {
    /// Create a client-side `StreamIdProvider`.
    pub fn new_for_client() -> StreamIdProvider {
        StreamIdProvider(AtomicU64::new(1))
    }

    /// Create a server-side `StreamIdProvider`.
    pub fn new_for_server() -> StreamIdProvider {
        StreamIdProvider(AtomicU64::new(2))
    }

    /// Returns the next stream ID along with a hint for whether the allocator is still within
    /// its first half-cycle (2^30 calls).
    ///
    /// `first_cycle == false` is a hint, not a guarantee of collision: callers that see `false`
    /// should consult the stream registry before reusing an ID, per the connection's wraparound
    /// policy.
    pub fn next(&self) -> (u32, bool) {
        loop {
            let raw = self.0.fetch_add(2, Ordering::Relaxed);
            let masked = raw & STREAM_ID_MASK;
            if masked == 0 {
                continue;
            }
            return (masked as u32, raw <= FIRST_CYCLE_CEILING);
        }
    }

    /// Returns the next available stream ID, skipping any ID already present in `store`.
    ///
    /// Retained for callers that allocate and register a stream in one step; prefer [`next`]
    /// paired with an explicit registry lookup for new code.
    ///
    /// [`next`]: StreamIdProvider::next
    pub fn next_stream_id<T>(&self, store: &DashMap<u32, T>) -> u32 {
        loop {
            let (sid, _) = self.next();
            if !store.contains_key(&sid) {
                return sid;
            }
        }
    }

    // for testing only
    fn _new(init: u64) -> StreamIdProvider {
        StreamIdProvider(AtomicU64::new(init))
    }
}


#[cfg(all(test, loom))]
mod loom_tests {
    use super::*;
    use loom::sync::Arc;

    #[test]
    fn assert_thread_safe() {
        loom::model(|| {
            let gen = Arc::new(StreamIdProvider::new_for_server());

            let threads: Vec<_> = (0..2)
                .map(|_| {
                    let gen = gen.clone();
                    loom::thread::spawn(move || {
                        gen.next();
                    })
                })
                .collect();

            gen.next();
            gen.next();

            for th in threads {
                th.join().unwrap()
            }

            // 4 calls precede this one (2 from the spawned threads, 2 from this thread),
            // each consuming one fetch_add(2) from a start of 2, with no collisions to skip.
            assert_eq!(gen.next().0, 10);
        })
    }
}
