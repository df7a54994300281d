//! Session key generation
//!
//! Keys are drawn from a fixed alphanumeric alphabet. The generator is seeded
//! from OS entropy once per process; uniqueness is probabilistic only.

use std::sync::{Mutex, OnceLock};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz\
ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn process_rng() -> &'static Mutex<StdRng> {
    static RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();
    RNG.get_or_init(|| Mutex::new(StdRng::from_entropy()))
}

/// Generate a random key of `length` characters
pub fn generate(length: usize) -> String {
    // A poisoned lock still holds a usable RNG.
    let mut rng = process_rng()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    generate_with(&mut *rng, length)
}

/// Generate a key from a caller-provided random source
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
