//! Random identifier generation.
use rand::Rng;

/// Characters an identifier may be built from.
pub const DEFAULT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// Identifier length used by the host unless configured otherwise.
pub const DEFAULT_ID_LENGTH: usize = 6;

/// Endless source of random identifiers.
///
/// Every call to `next` draws each character independently and uniformly
/// from the alphabet, so the same identifier can come up more than once.
/// Nothing is remembered between calls.
///
/// ```rust
/// # use boxprobe::generator::IdGenerator;
/// let mut ids = IdGenerator::default();
/// let id = ids.next().unwrap();
/// assert_eq!(id.len(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct IdGenerator {
    alphabet: Vec<char>,
    length: usize,
}

impl IdGenerator {
    /// Builds a generator over `alphabet`. An empty alphabet falls back to
    /// [`DEFAULT_ALPHABET`].
    pub fn new(alphabet: &str, length: usize) -> Self {
        let mut chars: Vec<char> = alphabet.chars().collect();
        if chars.is_empty() {
            chars = DEFAULT_ALPHABET.chars().collect();
        }

        Self {
            alphabet: chars,
            length,
        }
    }

    /// Default alphabet, custom length.
    pub fn with_length(length: usize) -> Self {
        Self::new(DEFAULT_ALPHABET, length)
    }

    /// Characters per identifier.
    pub const fn length(&self) -> usize {
        self.length
    }

    fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| self.alphabet[rng.random_range(0..self.alphabet.len())])
            .collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::with_length(DEFAULT_ID_LENGTH)
    }
}

impl Iterator for IdGenerator {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.generate())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}
