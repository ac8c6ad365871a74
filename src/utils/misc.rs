/// Mass number embedded in a metal tag, e.g. `Y(89)`, `Ir193` or `ArAr(80)`.
///
/// The instrument writes the mass as the only digits of the tag.
pub fn mass_from_metal(metal: &str) -> Option<f64> {
    let digits: String = metal.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Encode text as UTF-16LE bytes, the encoding of the embedded schema.
pub fn encode_utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}
