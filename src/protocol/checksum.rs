//! XOR checksum of the region between `$` and `*`.

/// Folds every byte of `region` with XOR
pub fn xor_checksum(region: &[u8]) -> u8 {
    region.iter().fold(0u8, |acc, byte| acc ^ byte)
}

/// Renders a checksum as two uppercase hex digits
pub fn render_hex(checksum: u8) -> [u8; 2] {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    [DIGITS[(checksum >> 4) as usize], DIGITS[(checksum & 0x0f) as usize]]
}

/// Parses exactly two hex digits.
///
/// Lowercase digits are accepted on ingress; anything else, including signs
/// and whitespace, is rejected.
pub fn parse_hex(digits: [u8; 2]) -> Option<u8> {
    let high = hex_value(digits[0])?;
    let low = hex_value(digits[1])?;
    Some((high << 4) | low)
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}
