//! Challenge and signature arithmetic used by the share service installer page

use crate::utils::hex;

/// Number of leading characters of a signature that are significant
const SIGNATURE_CHARS: usize = 24;

/// Canonicalize a `timeSign` value.
///
/// The first 24 characters are read as 12 two-character hex pairs and re-encoded
/// as lowercase hex. Pairs that are not valid hex are skipped.
pub fn normalize_signature(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().take(SIGNATURE_CHARS).collect();
    let bytes: Vec<u8> = chars
        .chunks(2)
        .filter_map(|pair| {
            let pair: String = pair.iter().collect();
            u8::from_str_radix(&pair, 16).ok()
        })
        .collect();
    hex::encode(bytes)
}

/// Build the `finalCode` challenge: `(authcode XOR random)` followed by `random`
/// zero-padded to six digits
pub fn challenge_code(authcode: u64, random: u64) -> String {
    format!("{}{:06}", authcode ^ random, random)
}

/// Six-digit random component derived from a millisecond timestamp
pub fn random_component(now_millis: u64) -> u64 {
    now_millis % 1_000_000
}
