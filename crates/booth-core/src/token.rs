//! Participant token generation.
//!
//! Tokens are short digit strings handed to a participant after
//! registration. They are random, not unique: two sessions may receive the
//! same token and nothing checks for it.

use rand::Rng;

/// Generates fixed-length decimal tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenGenerator {
    length: usize,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

impl TokenGenerator {
    /// Creates a generator for tokens of `length` digits.
    #[must_use]
    pub const fn new(length: usize) -> Self {
        Self { length }
    }

    /// Number of digits per token.
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Generates a token using the thread-local RNG.
    #[must_use]
    pub fn generate(&self) -> String {
        self.generate_with(&mut rand::thread_rng())
    }

    /// Generates a token from the given RNG, each digit drawn uniformly.
    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        (0..self.length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}
