//! # Discount Codes
//!
//! Generates `DISCOUNT_` + 8 uppercase alphanumeric characters.
//!
//! ## Uniqueness
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  candidates() ──► DISCOUNT_7QK2M9XA ──► issued anywhere? ── yes ──┐    │
//! │       ▲                                      │                     │    │
//! │       └──────────────────────────────────────┼─────────────────────┘    │
//! │                                              no                         │
//! │                                              ▼                          │
//! │                                         use this code                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! The "issued anywhere?" check lives with the caller (it needs the store),
//! so this module only produces candidates. Uniqueness is global across all
//! accounts. With 36^8 codes a retry is rare; attempts are still bounded.
//!
//! The random source is not cryptographic. A guessed code only ever yields a
//! single discounted order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{CoreError, CoreResult};

/// Prefix shared by every generated code.
pub const CODE_PREFIX: &str = "DISCOUNT_";

/// Number of random characters after the prefix.
pub const CODE_SUFFIX_LEN: usize = 8;

/// Candidates tried before giving up.
pub const MAX_ATTEMPTS: u32 = 32;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Produces discount code candidates.
#[derive(Debug, Clone)]
pub struct DiscountCodeGenerator {
    rng: StdRng,
}

impl DiscountCodeGenerator {
    /// Creates a generator seeded from the OS.
    pub fn new() -> Self {
        DiscountCodeGenerator {
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a deterministic generator (for tests and seeding).
    pub fn with_seed(seed: u64) -> Self {
        DiscountCodeGenerator {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Returns a single random code. Does not check uniqueness.
    pub fn candidate(&mut self) -> String {
        let mut code = String::with_capacity(CODE_PREFIX.len() + CODE_SUFFIX_LEN);
        code.push_str(CODE_PREFIX);
        for _ in 0..CODE_SUFFIX_LEN {
            let idx = self.rng.gen_range(0..CHARSET.len());
            code.push(CHARSET[idx] as char);
        }
        code
    }

    /// Yields at most [`MAX_ATTEMPTS`] candidates.
    ///
    /// ## Example
    /// ```rust,ignore
    /// for code in generator.candidates() {
    ///     if !repo.code_exists(&code).await? {
    ///         return Ok(code);
    ///     }
    /// }
    /// Err(CoreError::CodeSpaceExhausted { attempts: MAX_ATTEMPTS })
    /// ```
    pub fn candidates(&mut self) -> impl Iterator<Item = String> + '_ {
        (0..MAX_ATTEMPTS).map(move |_| self.candidate())
    }

    /// Returns the first candidate for which `is_taken` is false.
    ///
    /// Synchronous variant for callers holding the issued codes in memory.
    pub fn generate_unique<F>(&mut self, mut is_taken: F) -> CoreResult<String>
    where
        F: FnMut(&str) -> bool,
    {
        self.candidates()
            .find(|code| !is_taken(code))
            .ok_or(CoreError::CodeSpaceExhausted {
                attempts: MAX_ATTEMPTS,
            })
    }
}

impl Default for DiscountCodeGenerator {
    fn default() -> Self {
        DiscountCodeGenerator::new()
    }
}

/// Checks whether a string has the generated code shape `DISCOUNT_[A-Z0-9]{8}`.
///
/// Codes assigned by an administrator do not have to match this shape.
pub fn is_well_formed(code: &str) -> bool {
    match code.strip_prefix(CODE_PREFIX) {
        Some(suffix) => {
            suffix.len() == CODE_SUFFIX_LEN
                && suffix
                    .bytes()
                    .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        }
        None => false,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
