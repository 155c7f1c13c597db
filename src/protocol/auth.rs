//! Server greeting and chap-sha1 challenge-response.
//!
//! On connect the server sends a fixed 128-byte banner:
//! ```text
//! ┌──────────────────────────┬───────────────────────┬──────────────┐
//! │ Version line (64 bytes)  │ Base64 salt (44 bytes)│ Padding (20) │
//! └──────────────────────────┴───────────────────────┴──────────────┘
//! ```
//!
//! The salt is consumed once to derive the scramble:
//! ```text
//! step1    = SHA1(password)
//! step2    = SHA1(step1)
//! step3    = SHA1(salt[0..20] ++ step2)
//! scramble = step1 XOR step3
//! ```

use base64::Engine;
use sha1::{Digest, Sha1};

use super::request::SCRAMBLE_SIZE;
use super::wire_format::{GREETING_SIZE, SALT_LENGTH, SALT_OFFSET};
use crate::error::{Result, TarantoolError};

/// Parsed server greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Server version line, trimmed.
    pub version: String,
    /// Base64 salt string.
    pub salt: String,
}

impl Greeting {
    /// Parse the 128-byte banner.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the banner is short or the salt is not
    /// ASCII.
    pub fn parse(banner: &[u8]) -> Result<Self> {
        if banner.len() < GREETING_SIZE {
            return Err(TarantoolError::Protocol(format!(
                "greeting is {} bytes, expected {}",
                banner.len(),
                GREETING_SIZE
            )));
        }

        let salt = &banner[SALT_OFFSET..SALT_OFFSET + SALT_LENGTH];
        if !salt.is_ascii() {
            return Err(TarantoolError::Protocol(
                "greeting salt is not ASCII".to_string(),
            ));
        }

        let version = String::from_utf8_lossy(&banner[..SALT_OFFSET])
            .trim()
            .to_string();

        Ok(Self {
            version,
            salt: String::from_utf8_lossy(salt).into_owned(),
        })
    }
}

/// Derive the chap-sha1 scramble for `password` using the greeting salt.
///
/// # Errors
///
/// Returns a protocol error if the salt is not valid base64 or decodes to
/// fewer than 20 bytes.
pub fn scramble(password: &str, salt: &str) -> Result<[u8; SCRAMBLE_SIZE]> {
    let salt = base64::engine::general_purpose::STANDARD
        .decode(salt.trim())
        .map_err(|e| TarantoolError::Protocol(format!("invalid salt: {}", e)))?;

    if salt.len() < SCRAMBLE_SIZE {
        return Err(TarantoolError::Protocol(format!(
            "salt is {} bytes, need at least {}",
            salt.len(),
            SCRAMBLE_SIZE
        )));
    }

    let step1 = Sha1::digest(password.as_bytes());
    let step2 = Sha1::digest(step1);

    let mut hasher = Sha1::new();
    hasher.update(&salt[..SCRAMBLE_SIZE]);
    hasher.update(step2);
    let step3 = hasher.finalize();

    let mut out = [0u8; SCRAMBLE_SIZE];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = step1[i] ^ step3[i];
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_SALT: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    /// Build a greeting banner carrying `salt`.
    pub(crate) fn greeting_banner(salt: &str) -> Vec<u8> {
        let mut banner = vec![b' '; GREETING_SIZE];
        let version = b"Tarantool 2.11.1 (Binary) 7b4c1e3a-0000-0000-0000-000000000000";
        banner[..version.len()].copy_from_slice(version);
        banner[SALT_OFFSET - 1] = b'\n';
        banner[SALT_OFFSET..SALT_OFFSET + salt.len()].copy_from_slice(salt.as_bytes());
        banner[GREETING_SIZE - 1] = b'\n';
        banner
    }

    #[test]
    fn test_scramble_reference_vector() {
        let expected = [
            0x21, 0xb3, 0xff, 0x40, 0x5f, 0x32, 0xcb, 0xe4, 0xaa, 0xff, 0xf2, 0x91, 0x39, 0x60,
            0x46, 0xea, 0x29, 0xfa, 0x3a, 0x4d,
        ];
        assert_eq!(scramble("secret", TEST_SALT).unwrap(), expected);
    }

    #[test]
    fn test_scramble_second_vector() {
        let salt = "Wc2qYb0dPvXF9CZK0WWHOBD8lYuhgxRQDK0xx3ITxNc=";
        let expected = [
            0x42, 0xa8, 0x4b, 0x9c, 0xf3, 0xa9, 0x5c, 0xec, 0x57, 0x6c, 0x0c, 0x8b, 0x4d, 0x1c,
            0xf5, 0xe0, 0xca, 0xf5, 0xac, 0x85,
        ];
        assert_eq!(scramble("secret", salt).unwrap(), expected);
    }

    #[test]
    fn test_scramble_is_deterministic() {
        assert_eq!(
            scramble("pw", TEST_SALT).unwrap(),
            scramble("pw", TEST_SALT).unwrap()
        );
        assert_ne!(
            scramble("pw", TEST_SALT).unwrap(),
            scramble("pw2", TEST_SALT).unwrap()
        );
    }

    #[test]
    fn test_scramble_rejects_bad_salt() {
        assert!(scramble("pw", "not base64!").is_err());
        // Valid base64 but only 3 bytes
        assert!(scramble("pw", "AAAA").is_err());
    }

    #[test]
    fn test_parse_greeting() {
        let greeting = Greeting::parse(&greeting_banner(TEST_SALT)).unwrap();

        assert_eq!(greeting.salt, TEST_SALT);
        assert!(greeting.version.starts_with("Tarantool 2.11.1"));
    }

    #[test]
    fn test_parse_short_greeting() {
        let banner = greeting_banner(TEST_SALT);
        let err = Greeting::parse(&banner[..100]).unwrap_err();
        assert!(err.to_string().contains("expected 128"));
    }
}
