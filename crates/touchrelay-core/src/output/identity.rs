// Touchrelay Output Layer - Randomized Identity
// Per-session device name and physical path strings

use std::time::{SystemTime, UNIX_EPOCH};

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Shortest generated identifier
pub const MIN_IDENT_LEN: usize = 5;
/// Longest generated identifier
pub const MAX_IDENT_LEN: usize = 14;

/// Byte source backed by getrandom(2), with a clock-seeded splitmix64
/// stream if the syscall is unavailable.
pub struct RandomBytes {
    fallback: u64,
}

impl RandomBytes {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9e37_79b9_7f4a_7c15)
            ^ u64::from(std::process::id());
        Self { fallback: seed }
    }

    fn next_fallback(&mut self) -> u64 {
        self.fallback = self.fallback.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.fallback;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    pub fn fill(&mut self, buf: &mut [u8]) {
        let filled = unsafe { libc::getrandom(buf.as_mut_ptr().cast(), buf.len(), 0) };
        if filled >= 0 && filled as usize == buf.len() {
            return;
        }
        for chunk in buf.chunks_mut(8) {
            let bytes = self.next_fallback().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    /// Uniform-enough value in `low..=high` for identifiers.
    pub fn in_range(&mut self, low: usize, high: usize) -> usize {
        let mut buf = [0u8; 4];
        self.fill(&mut buf);
        low + (u32::from_le_bytes(buf) as usize) % (high - low + 1)
    }

    /// Random alphanumeric string of `len` characters.
    pub fn alphanumeric(&mut self, len: usize) -> String {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf);
        buf.iter()
            .map(|b| ALPHANUMERIC[*b as usize % ALPHANUMERIC.len()] as char)
            .collect()
    }
}

impl Default for RandomBytes {
    fn default() -> Self {
        Self::new()
    }
}

/// Name and phys strings for one virtual device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomIdentity {
    pub name: String,
    pub phys: String,
}

impl RandomIdentity {
    pub fn generate() -> Self {
        let mut rng = RandomBytes::new();
        let len = rng.in_range(MIN_IDENT_LEN, MAX_IDENT_LEN);
        Self {
            name: rng.alphanumeric(len),
            phys: rng.alphanumeric(len),
        }
    }
}
