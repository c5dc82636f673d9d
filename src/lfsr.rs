// src/lfsr.rs
//
// Pseudo-random byte sources for exploration draws.
//
// The reference source is a 16-bit Fibonacci LFSR (taps 16, 14, 13, 11;
// maximal length 65535). It is deterministic and not cryptographic. Other
// sources plug in through `ByteSource`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Default LFSR seed.
pub const DEFAULT_LFSR_SEED: u16 = 0xACE1;

/// A deterministic stream of bytes.
pub trait ByteSource {
    fn next_byte(&mut self) -> u8;

    /// Restart the stream from its seed.
    fn reseed(&mut self);
}

/// 16-bit Fibonacci LFSR. Each byte draw shifts the register eight times
/// and returns its low byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lfsr16 {
    seed: u16,
    state: u16,
}

impl Lfsr16 {
    /// A zero seed would lock the register; it is remapped to the default.
    pub fn new(seed: u16) -> Self {
        let seed = if seed == 0 { DEFAULT_LFSR_SEED } else { seed };
        Self { seed, state: seed }
    }

    pub fn state(&self) -> u16 {
        self.state
    }

    /// Advance one bit.
    pub fn shift(&mut self) -> u16 {
        let s = self.state;
        let bit = (s ^ (s >> 2) ^ (s >> 3) ^ (s >> 5)) & 1;
        self.state = (s >> 1) | (bit << 15);
        self.state
    }
}

impl Default for Lfsr16 {
    fn default() -> Self {
        Self::new(DEFAULT_LFSR_SEED)
    }
}

impl ByteSource for Lfsr16 {
    fn next_byte(&mut self) -> u8 {
        for _ in 0..8 {
            self.shift();
        }
        (self.state & 0xFF) as u8
    }

    fn reseed(&mut self) {
        self.state = self.seed;
    }
}

/// Seeded ChaCha8 stream, for runs that do not need LFSR bit parity.
#[derive(Debug, Clone)]
pub struct ChaChaSource {
    seed: u64,
    rng: ChaCha8Rng,
}

impl ChaChaSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl ByteSource for ChaChaSource {
    fn next_byte(&mut self) -> u8 {
        self.rng.gen()
    }

    fn reseed(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
    }
}

/// Replays a fixed byte script, cycling when exhausted. An empty script
/// yields 0xFF (never explores).
#[derive(Debug, Clone, Default)]
pub struct ScriptedBytes {
    script: Vec<u8>,
    pos: usize,
}

impl ScriptedBytes {
    pub fn new(script: impl Into<Vec<u8>>) -> Self {
        Self {
            script: script.into(),
            pos: 0,
        }
    }
}

impl ByteSource for ScriptedBytes {
    fn next_byte(&mut self) -> u8 {
        if self.script.is_empty() {
            return 0xFF;
        }
        let b = self.script[self.pos % self.script.len()];
        self.pos = (self.pos + 1) % self.script.len();
        b
    }

    fn reseed(&mut self) {
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn lfsr_has_maximal_period() {
        let mut l = Lfsr16::default();
        let start = l.state();
        let mut period = 0u32;
        loop {
            l.shift();
            period += 1;
            if l.state() == start {
                break;
            }
            assert!(period <= 65_535);
        }
        assert_eq!(period, 65_535);
    }

    #[test]
    fn lfsr_never_reaches_zero() {
        let mut l = Lfsr16::new(1);
        for _ in 0..70_000 {
            assert_ne!(l.shift(), 0);
        }
    }

    #[test]
    fn zero_seed_is_remapped() {
        assert_eq!(Lfsr16::new(0), Lfsr16::default());
    }

    #[test]
    fn reseed_replays_stream() {
        let mut l = Lfsr16::new(0x1234);
        let first: Vec<u8> = (0..16).map(|_| l.next_byte()).collect();
        l.reseed();
        let second: Vec<u8> = (0..16).map(|_| l.next_byte()).collect();
        assert_eq!(first, second);

        let mut c = ChaChaSource::new(7);
        let a: Vec<u8> = (0..16).map(|_| c.next_byte()).collect();
        c.reseed();
        let b: Vec<u8> = (0..16).map(|_| c.next_byte()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn lfsr_bytes_cover_range() {
        let mut l = Lfsr16::default();
        let seen: HashSet<u8> = (0..4096).map(|_| l.next_byte()).collect();
        assert!(seen.len() > 200);
    }

    #[test]
    fn scripted_bytes_cycle() {
        let mut s = ScriptedBytes::new(vec![1, 2]);
        assert_eq!([s.next_byte(), s.next_byte(), s.next_byte()], [1, 2, 1]);
        assert_eq!(ScriptedBytes::default().next_byte(), 0xFF);
    }
}
