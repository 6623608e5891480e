//! Session and mail identifiers.
//!
//! Identifiers are random, fixed-length strings drawn from a consonant-only
//! alphabet, so a generated id can never accidentally spell out a word that
//! would skew spam scoring when it ends up quoted in a `Received` header.

use rand::Rng;

const LENGTH: usize = 12;
const ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxyzBCDFGHJKLMNPQRSTVWXYZ";

/// Generate a new random, 12-character session/mail identifier.
#[must_use]
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..ALPHABET.len());
            ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generates_the_expected_length() {
        let id = generate();
        assert_eq!(id.chars().count(), LENGTH);
    }

    #[test]
    fn only_uses_consonants() {
        let id = generate();
        assert!(id
            .chars()
            .all(|c| ALPHABET.contains(&(c as u8)) && c.is_ascii_alphabetic()));
    }

    #[test]
    fn ids_are_not_trivially_repeated() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }
}
