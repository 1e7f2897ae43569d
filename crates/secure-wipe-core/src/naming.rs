use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt::Write as _;

/// 48 hex characters, 192 bits of entropy.
pub const DEFAULT_NAME_LENGTH: usize = 48;

/// Extension given to renamed files and dummy files.
pub const NEUTRAL_EXTENSION: &str = "tmp";

/// Generate `length` lowercase hex characters from the OS CSPRNG.
///
/// Collisions are not handled here; at the default width they are treated as impossible.
pub fn generate(length: usize) -> String {
    let mut bytes = vec![0u8; length.div_ceil(2)];
    OsRng.fill_bytes(&mut bytes);

    let mut name = String::with_capacity(bytes.len() * 2);
    for byte in &bytes {
        let _ = write!(name, "{:02x}", byte);
    }
    name.truncate(length);
    name
}

/// A random name with the neutral extension appended.
pub fn generate_file_name(length: usize) -> String {
    format!("{}.{}", generate(length), NEUTRAL_EXTENSION)
}

pub fn is_hex_name(name: &str, length: usize) -> bool {
    name.len() == length && name.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}
