// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Auto-generated document identifiers.

use ring::rand::{SecureRandom, SystemRandom};

use super::DbError;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const ID_LEN: usize = 20;

/// Generate a 20 character alphanumeric id, the same shape Firestore uses.
pub fn auto_id() -> Result<String, DbError> {
    let rng = SystemRandom::new();
    // Largest multiple of the alphabet size that fits in a byte; bytes above
    // it are rejected so every character is equally likely.
    let limit = (256 / ALPHABET.len() * ALPHABET.len()) as u8;
    let mut id = String::with_capacity(ID_LEN);
    let mut buf = [0u8; 32];

    while id.len() < ID_LEN {
        rng.fill(&mut buf)
            .map_err(|_| DbError::Backend("System random source failed".to_string()))?;
        for &byte in buf.iter().filter(|&&b| b < limit) {
            if id.len() == ID_LEN {
                break;
            }
            id.push(ALPHABET[byte as usize % ALPHABET.len()] as char);
        }
    }

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_id_shape() {
        let id = auto_id().unwrap();
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_auto_ids_differ() {
        assert_ne!(auto_id().unwrap(), auto_id().unwrap());
    }
}
