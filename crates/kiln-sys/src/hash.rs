//! Content fingerprinting for cache keys

/// Deterministic, non-cryptographic fingerprint of `content`.
///
/// A 32-bit rolling hash (`h = h * 31 + c`, wrapping) over the UTF-16 code
/// units of the input, rendered as the decimal absolute value. Empty input
/// yields an empty string.
pub fn generate_content_hash(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    let hash = content
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit))
        });
    hash.unsigned_abs().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(generate_content_hash(""), "");
    }

    #[test]
    fn test_known_values() {
        assert_eq!(generate_content_hash("a"), "97");
        assert_eq!(generate_content_hash("ab"), "3105");
        // wraps past i32::MAX and takes the absolute value
        assert_eq!(generate_content_hash("hello world"), "1794106052");
    }

    #[test]
    fn test_deterministic_and_distinct() {
        let a = generate_content_hash("export const a = 1;");
        let b = generate_content_hash("export const a = 2;");
        assert_eq!(a, generate_content_hash("export const a = 1;"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_utf16_units() {
        // one astral char is two code units
        let astral = generate_content_hash("\u{1F600}");
        let manual = {
            let hi: i32 = 0xD83D;
            let lo: i32 = 0xDE00;
            let h = hi;
            ((h << 5).wrapping_sub(h).wrapping_add(lo)).unsigned_abs().to_string()
        };
        assert_eq!(astral, manual);
    }
}
