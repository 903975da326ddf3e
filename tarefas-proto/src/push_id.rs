//! Store-generated child keys.
//!
//! Keys are 20 characters: 8 encoding the creation time in milliseconds
//! followed by 12 random characters, all drawn from an alphabet whose
//! ASCII order matches its numeric order. Lexicographic key order is
//! therefore creation order. Keys produced by one generator within the
//! same millisecond increment the random suffix, so a generator never
//! repeats a key and its keys are strictly increasing.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::task::TaskKey;

/// The 64-character key alphabet in ascending ASCII order.
pub const PUSH_CHARS: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Length of a generated key.
pub const PUSH_ID_LEN: usize = 20;

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = PUSH_ID_LEN - TIME_CHARS;

/// Generates ordered, collision-resistant child keys.
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    last_ms: Option<u64>,
    last_random: [u8; RANDOM_CHARS],
}

impl PushIdGenerator {
    /// Creates a generator with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a key stamped with the current wall-clock time.
    pub fn next_key(&mut self) -> TaskKey {
        self.next_key_at(now_ms())
    }

    /// Generates a key stamped with `now_ms`.
    ///
    /// A timestamp older than the previous one is treated as equal to it,
    /// so a clock step backwards cannot break ordering.
    pub fn next_key_at(&mut self, now_ms: u64) -> TaskKey {
        let mut ms = self.last_ms.map_or(now_ms, |last| now_ms.max(last));

        if self.last_ms == Some(ms) {
            if !increment(&mut self.last_random) {
                // Suffix space exhausted within one millisecond: borrow the next one.
                ms += 1;
                self.randomize();
            }
        } else {
            self.randomize();
        }
        self.last_ms = Some(ms);

        let mut key = [0u8; PUSH_ID_LEN];
        let mut remaining = ms;
        for slot in key[..TIME_CHARS].iter_mut().rev() {
            *slot = PUSH_CHARS[(remaining % 64) as usize];
            remaining /= 64;
        }
        for (slot, index) in key[TIME_CHARS..].iter_mut().zip(self.last_random) {
            *slot = PUSH_CHARS[usize::from(index)];
        }
        TaskKey::new(key.iter().map(|&b| char::from(b)).collect::<String>())
    }

    fn randomize(&mut self) {
        let mut rng = rand::rng();
        for slot in &mut self.last_random {
            *slot = rng.random_range(0..64);
        }
    }
}

/// Adds one to a base-64 digit string. Returns `false` on overflow.
fn increment(digits: &mut [u8; RANDOM_CHARS]) -> bool {
    for digit in digits.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return true;
        }
    }
    false
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    u64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis(),
    )
    .unwrap_or(u64::MAX)
}
