//! Parsers for the text emitted by `fsutil usn queryjournal` and
//! `vssadmin list shadowstorage`. Kept platform-independent so they can be tested anywhere.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageLimit {
    Bytes(u64),
    Unbounded,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadowStorageInfo {
    pub used: Option<u64>,
    pub allocated: Option<u64>,
    pub max: Option<StorageLimit>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalInfo {
    pub max_size: Option<u64>,
    pub allocation_delta: Option<u64>,
}

fn value_after_colon(line: &str) -> Option<&str> {
    line.split_once(':').map(|(_, value)| value.trim())
}

/// `0x0000000002000000`, optionally followed by a human-readable suffix.
fn parse_number(text: &str) -> Option<u64> {
    let token = text.split_whitespace().next()?;
    match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => token.replace(',', "").parse().ok(),
    }
}

pub fn parse_journal_info(output: &str) -> JournalInfo {
    let mut info = JournalInfo::default();
    for line in output.lines() {
        let line = line.trim();
        if line.starts_with("Maximum Size") || line.starts_with("Max Size") {
            info.max_size = value_after_colon(line).and_then(parse_number);
        } else if line.starts_with("Allocation Delta") {
            info.allocation_delta = value_after_colon(line).and_then(parse_number);
        }
    }
    info
}

/// Parse sizes such as `1.234 GB`, `512 MB (3%)` or `1,024 bytes`.
pub fn parse_size_string(text: &str) -> Option<u64> {
    let mut parts = text.split_whitespace();
    let value: f64 = parts.next()?.replace(',', "").parse().ok()?;
    let unit = parts.next()?.to_ascii_uppercase();

    let multiplier: u64 = match unit.as_str() {
        "B" | "BYTES" => 1,
        "KB" => 1 << 10,
        "MB" => 1 << 20,
        "GB" => 1 << 30,
        "TB" => 1 << 40,
        "PB" => 1 << 50,
        _ => return None,
    };
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier as f64).round() as u64)
}

fn parse_limit(text: &str) -> Option<StorageLimit> {
    if text.to_ascii_uppercase().starts_with("UNBOUNDED") {
        return Some(StorageLimit::Unbounded);
    }
    parse_size_string(text).map(StorageLimit::Bytes)
}

pub fn parse_shadow_storage(output: &str) -> ShadowStorageInfo {
    let mut info = ShadowStorageInfo::default();
    for line in output.lines() {
        let line = line.trim();
        let Some(value) = value_after_colon(line) else {
            continue;
        };
        if line.starts_with("Used Shadow Copy Storage space") {
            info.used = parse_size_string(value);
        } else if line.starts_with("Allocated Shadow Copy Storage space") {
            info.allocated = parse_size_string(value);
        } else if line.starts_with("Maximum Shadow Copy Storage space") {
            info.max = parse_limit(value);
        }
    }
    info
}
