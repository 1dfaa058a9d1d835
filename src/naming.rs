//! Random instance identifiers.

use rand_core::RngCore;

/// Length of a generated instance id.
pub const ID_LEN: usize = 10;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Largest multiple of the alphabet size that fits in a byte; bytes at or
/// above it are redrawn so every letter is equally likely.
const ACCEPT_BELOW: u8 = (256 - 256 % ALPHABET.len()) as u8;

/// Draw a single id of [`ID_LEN`] letters from `[A-Za-z]`.
pub fn random_id<R: RngCore + ?Sized>(rng: &mut R) -> String {
    let mut id = String::with_capacity(ID_LEN);
    let mut byte = [0u8; 1];
    while id.len() < ID_LEN {
        rng.fill_bytes(&mut byte);
        if byte[0] < ACCEPT_BELOW {
            id.push(ALPHABET[byte[0] as usize % ALPHABET.len()] as char);
        }
    }
    id
}

/// Draw ids until one collides with nothing in `taken`.
///
/// `taken` may hold bare ids or full prefixed names; comparison ignores
/// case because the manager treats instance names case-insensitively.
pub fn unique_id<R: RngCore + ?Sized>(rng: &mut R, prefix: &str, taken: &[String]) -> String {
    loop {
        let id = random_id(rng);
        let name = format!("{prefix}{id}");
        let clash = taken
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&id) || t.eq_ignore_ascii_case(&name));
        if !clash {
            return id;
        }
        tracing::debug!(%id, "generated id already in use, drawing again");
    }
}
