//! Folder and file naming for the spool layout.
//!
//! Hour folders and segment files are named with a base-32 encoding using
//! the alphabet `0123456789abcdefghijklmnopqrstuv` without padding:
//!
//! ```text
//! <base>/<base32(hour & 0xFFFFFF, 3 bytes BE)>/<base32(serial, 2 or 4 bytes BE)>
//! ```
//!
//! Serial numbers up to `0xFFFF` are encoded from 2 bytes (4 characters);
//! larger serials are encoded from 4 bytes (7 characters). Because the width
//! changes, lexicographic order of file names does not follow serial order
//! across that boundary. Sort with [`parse_file_name`] when order matters.

use std::path::{Path, PathBuf};

/// Base-32 alphabet used for all spool names (RFC 4648 base32hex, lowercase).
const ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Mask applied to hour buckets (24 bits).
pub const HOUR_MASK: u32 = 0x00FF_FFFF;

/// Largest serial encoded with the short (2-byte) form.
pub const SHORT_SERIAL_MAX: u32 = 0xFFFF;

/// Name of the append-only index file inside each hour folder.
pub const INDEX_FILE_NAME: &str = "_index";

/// Name of the retirement marker file inside each hour folder.
pub const MARKER_FILE_NAME: &str = "_t";

/// Returns the masked hour bucket for a UNIX timestamp in seconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // masked to 24 bits
pub fn hour_bucket(unix_seconds: i64) -> u32 {
    (unix_seconds.div_euclid(3600) & i64::from(HOUR_MASK)) as u32
}

/// Returns the folder name for an hour bucket.
///
/// The hour is masked to 24 bits and the low 3 big-endian bytes are encoded.
///
/// ```
/// use tracespool::naming::folder_name;
///
/// assert_eq!(folder_name(0), "00000");
/// assert_eq!(folder_name(1), "00002");
/// ```
pub fn folder_name(hour: u32) -> String {
    let buf = (hour & HOUR_MASK).to_be_bytes();
    encode(&buf[1..])
}

/// Returns the segment file name for a serial number.
///
/// ```
/// use tracespool::naming::file_name;
///
/// assert_eq!(file_name(0), "0000");
/// assert_eq!(file_name(1), "000g");
/// assert_eq!(file_name(0x1_0000).len(), 7);
/// ```
pub fn file_name(serial: u32) -> String {
    if serial > SHORT_SERIAL_MAX {
        encode(&serial.to_be_bytes())
    } else {
        #[allow(clippy::cast_possible_truncation)] // bounded by SHORT_SERIAL_MAX
        let short = serial as u16;
        encode(&short.to_be_bytes())
    }
}

/// Decodes a folder name back to its hour bucket.
///
/// Returns `None` if the name is not a 5-character spool folder name.
pub fn parse_folder_name(name: &str) -> Option<u32> {
    if name.len() != 5 {
        return None;
    }
    let bytes = decode(name, 3)?;
    Some(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
}

/// Decodes a segment file name back to its serial number.
///
/// Accepts both the 4-character (2-byte) and 7-character (4-byte) forms.
pub fn parse_file_name(name: &str) -> Option<u32> {
    match name.len() {
        4 => {
            let bytes = decode(name, 2)?;
            Some(u32::from(u16::from_be_bytes([bytes[0], bytes[1]])))
        }
        7 => {
            let bytes = decode(name, 4)?;
            Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        _ => None,
    }
}

/// Returns the path of the hour folder for `hour` under `base`.
pub fn folder_path(base: &Path, hour: u32) -> PathBuf {
    base.join(folder_name(hour))
}

/// Encodes bytes as unpadded base-32, most significant bit first.
fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in data {
        acc = (acc << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(char::from(ALPHABET[((acc >> bits) & 0x1F) as usize]));
        }
        acc &= (1 << bits) - 1;
    }

    if bits > 0 {
        out.push(char::from(ALPHABET[((acc << (5 - bits)) & 0x1F) as usize]));
    }

    out
}

/// Decodes unpadded base-32 into exactly `len` bytes.
///
/// Rejects characters outside the alphabet, a wrong length, and non-zero
/// trailing bits (non-canonical names).
fn decode(text: &str, len: usize) -> Option<Vec<u8>> {
    if text.len() != (len * 8).div_ceil(5) {
        return None;
    }

    let mut out = Vec::with_capacity(len);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;

    for c in text.bytes() {
        let value = ALPHABET.iter().position(|&a| a == c)?;
        #[allow(clippy::cast_possible_truncation)] // position in a 32-entry table
        let value = value as u32;
        acc = (acc << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            #[allow(clippy::cast_possible_truncation)] // masked to one byte
            out.push(((acc >> bits) & 0xFF) as u8);
        }
        acc &= (1 << bits) - 1;
    }

    if acc != 0 || out.len() != len {
        return None;
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_name_known_values() {
        assert_eq!(folder_name(0), "00000");
        // 0x000001 -> bits 000000000000000000000001 + 1 pad bit
        assert_eq!(folder_name(1), "00002");
        assert_eq!(folder_name(HOUR_MASK), "vvvvu");
    }

    #[test]
    fn test_folder_name_masks_high_byte() {
        assert_eq!(folder_name(0x0100_0005), folder_name(5));
    }

    #[test]
    fn test_file_name_widths() {
        assert_eq!(file_name(0), "0000");
        assert_eq!(file_name(1), "000g");
        assert_eq!(file_name(SHORT_SERIAL_MAX), "vvvg");
        assert_eq!(file_name(SHORT_SERIAL_MAX + 1), "000g000");
        assert_eq!(file_name(SHORT_SERIAL_MAX + 1).len(), 7);
    }

    #[test]
    fn test_file_names_lose_lexical_order_at_width_change() {
        // Known caveat: "000g000" sorts before "vvvg".
        let short = file_name(SHORT_SERIAL_MAX);
        let long = file_name(SHORT_SERIAL_MAX + 1);
        assert!(long < short);
    }

    #[test]
    fn test_parse_file_name_inverts_both_widths() {
        for serial in [0, 1, 31, 32, 1000, SHORT_SERIAL_MAX, SHORT_SERIAL_MAX + 1, 0x7FFF_FFFD] {
            assert_eq!(parse_file_name(&file_name(serial)), Some(serial));
        }
    }

    #[test]
    fn test_parse_folder_name_inverts() {
        for hour in [0, 1, 480_000, HOUR_MASK] {
            assert_eq!(parse_folder_name(&folder_name(hour)), Some(hour));
        }
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert_eq!(parse_file_name("_index"), None);
        assert_eq!(parse_file_name("_t"), None);
        assert_eq!(parse_file_name("000w"), None); // 'w' not in alphabet
        assert_eq!(parse_file_name("0001"), None); // non-zero trailing bits
        assert_eq!(parse_folder_name("abc"), None);
    }

    #[test]
    fn test_hour_bucket() {
        assert_eq!(hour_bucket(0), 0);
        assert_eq!(hour_bucket(3599), 0);
        assert_eq!(hour_bucket(3600), 1);
        assert_eq!(hour_bucket(1_700_000_000), 472_222);
    }
}
