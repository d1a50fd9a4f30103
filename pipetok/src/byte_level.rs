//! The GPT-2 byte-level alphabet.
//!
//! Byte-level BPE vocabularies are stored as text, but must be able to represent any byte
//! sequence.  Every byte is therefore mapped to a printable character: printable ASCII and most
//! of Latin-1 map to themselves, and the remaining 68 bytes (control characters, space, `0x7F`
//! through `0xA0` and the soft hyphen) map to consecutive characters starting at U+0100.  A space
//! becomes `Ġ` and a newline becomes `Ċ`.
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap as HashMap;

static BYTE_TO_CHAR: Lazy<[char; 256]> = Lazy::new(|| {
    let direct = |b: u8| matches!(b, b'!'..=b'~' | 0xA1..=0xAC | 0xAE..=0xFF);

    let mut table = ['\0'; 256];
    let mut next = 0x100u32;
    for b in 0..=255u8 {
        table[b as usize] = if direct(b) {
            b as char
        } else {
            let c = char::from_u32(next).unwrap_or(char::REPLACEMENT_CHARACTER);
            next += 1;
            c
        };
    }

    table
});

static CHAR_TO_BYTE: Lazy<HashMap<char, u8>> = Lazy::new(|| {
    BYTE_TO_CHAR
        .iter()
        .enumerate()
        .map(|(b, &c)| (c, b as u8))
        .collect()
});

pub fn byte_to_char(byte: u8) -> char {
    BYTE_TO_CHAR[byte as usize]
}

pub fn char_to_byte(c: char) -> Option<u8> {
    CHAR_TO_BYTE.get(&c).copied()
}

/// Remap every byte of `bytes` into the byte-level alphabet
pub fn encode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| byte_to_char(b)).collect()
}

/// Reverse [`encode`].
///
/// Characters outside of the byte-level alphabet can show up in tokens that were added to a
/// vocabulary by hand; those pass through as their own UTF-8 bytes.
pub fn decode(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match char_to_byte(c) {
            Some(b) => out.push(b),
            None => out.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn well_known_mappings() {
        assert_eq!('Ġ', byte_to_char(b' '));
        assert_eq!('Ċ', byte_to_char(b'\n'));
        assert_eq!('a', byte_to_char(b'a'));
        assert_eq!('Ā', byte_to_char(0));
        assert_eq!("ä½łå¥½", encode("你好".as_bytes()));
    }

    #[test]
    fn table_is_a_bijection() {
        assert_eq!(256, CHAR_TO_BYTE.len());
        for b in 0..=255u8 {
            assert_eq!(Some(b), char_to_byte(byte_to_char(b)));
        }
    }

    #[test]
    fn foreign_characters_pass_through() {
        assert_eq!("<|x|>€".as_bytes(), decode("<|x|>€").as_slice());
    }

    proptest! {
        #[test]
        fn round_trip(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(bytes.clone(), decode(&encode(&bytes)));
        }
    }
}
