//! Operations on ASCII slices, in the vein of (the defunct)
//! `std::ascii::AsciiExt`.
//!
//! Really, we are not working with ASCII, but with an unspecified 8-bit
//! character encoding that happens to be a superset of ASCII.  HTTP left the
//! character encoding used by headers and the like unspecified, but for our
//! purposes we'll pretend it's ISO-8859-1, aka the first 256 codepoints in
//! Unicode.

/// HTTP's idea of optional whitespace around header values.
const WHITESPACE: &[u8] = b" \t\r\n";

/// Strips leading and trailing whitespace (`SP HT CR LF`) from a slice.
pub fn trim(mut bytes: &[u8]) -> &[u8] {
    while let Some((first, rest)) = bytes.split_first() {
        if !WHITESPACE.contains(first) {
            break;
        }
        bytes = rest;
    }
    while let Some((last, rest)) = bytes.split_last() {
        if !WHITESPACE.contains(last) {
            break;
        }
        bytes = rest;
    }
    bytes
}

/// Renders bytes as lower-case hex, two digits per byte.  Used for debug
/// dumps of frame payloads and mask keys.
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! trim_case {
        ($input: expr, $output: expr) => {
            assert_eq!(trim($input), $output as &[u8]);
        };
    }

    #[test]
    fn test_trim_identity() {
        trim_case!(b"", b"");
        trim_case!(b"abcd", b"abcd");
        trim_case!(b"a b", b"a b");
    }

    #[test]
    fn test_trim_surrounding() {
        trim_case!(b"  abcd", b"abcd");
        trim_case!(b"abcd\t ", b"abcd");
        trim_case!(b" \tab cd\r\n", b"ab cd");
        trim_case!(b" \t\r\n", b"");
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(b""), "");
        assert_eq!(hex(&[0x00, 0x0f, 0xa5, 0xff]), "000fa5ff");
    }
}
