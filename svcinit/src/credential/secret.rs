//! Administrator secret generation.
//!
//! Secrets travel in a JSON body (`/users/admin/init`, `/auth`) and are
//! read verbatim by the managed service from the credential file, so the
//! symbol set is limited to characters that need no escaping in JSON
//! strings nor in form-encoded values.

use rand::Rng;
use rand::seq::SliceRandom;
use std::fmt;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"-_.";

/// Administrator secret.
///
/// `Debug` and `Display` are redacted; use [`Secret::expose`] where the raw
/// value must leave the process (request bodies, the credential file).
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generate a random secret of `length` characters.
    ///
    /// Every character class (upper, lower, digit, symbol) appears at least
    /// once; the remaining characters are drawn from the union and the
    /// result is shuffled. `length` below 4 is raised to 4.
    ///
    /// Randomness comes from `rand::rng()`, a ChaCha-based CSPRNG seeded
    /// from the operating system.
    pub fn generate(length: usize) -> Self {
        let length = length.max(4);
        let mut rng = rand::rng();

        let classes = [UPPER, LOWER, DIGITS, SYMBOLS];
        let alphabet: Vec<u8> = classes.concat();

        let mut chars: Vec<u8> = Vec::with_capacity(length);
        for class in classes {
            chars.push(class[rng.random_range(0..class.len())]);
        }
        while chars.len() < length {
            chars.push(alphabet[rng.random_range(0..alphabet.len())]);
        }
        chars.shuffle(&mut rng);

        // Every byte comes from an ASCII table above
        Self(chars.into_iter().map(char::from).collect())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every character belongs to the generator's alphabet.
    pub fn is_transport_safe(&self) -> bool {
        self.0.bytes().all(|b| {
            UPPER.contains(&b) || LOWER.contains(&b) || DIGITS.contains(&b) || SYMBOLS.contains(&b)
        })
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}
