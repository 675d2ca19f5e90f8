//! Compression Codec Module
//!
//! Reversible string compression for stored payloads. Encoded output carries
//! a one-byte format tag so plain and deflate payloads can coexist in the
//! same store and decoding never depends on configuration.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

/// Format tag for an uncompressed UTF-8 payload.
const FORMAT_PLAIN: u8 = 0;
/// Format tag for a zlib-deflated UTF-8 payload.
const FORMAT_DEFLATE: u8 = 1;

// == Codec ==
/// Payload compression algorithm.
///
/// `Plain` stores the UTF-8 bytes as-is (useful for already-compressed or
/// tiny payloads); `Deflate` is the default for disk-backed stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    /// No compression, payload stored verbatim
    Plain,
    /// zlib deflate
    #[default]
    Deflate,
}

impl Codec {
    // == Compress ==
    /// Compresses a string into a tagged byte payload.
    ///
    /// Infallible: if the encoder fails (it cannot when writing to memory),
    /// the payload degrades to the plain encoding rather than erroring.
    pub fn compress(&self, text: &str) -> Vec<u8> {
        match self {
            Codec::Plain => encode_plain(text),
            Codec::Deflate => {
                let mut encoder =
                    ZlibEncoder::new(vec![FORMAT_DEFLATE], flate2::Compression::default());
                if encoder.write_all(text.as_bytes()).is_err() {
                    return encode_plain(text);
                }
                match encoder.finish() {
                    Ok(buf) => buf,
                    Err(_) => encode_plain(text),
                }
            }
        }
    }

    // == Decompress ==
    /// Decodes a tagged byte payload back into a string.
    ///
    /// Decoding is driven by the payload's format tag, not by `self`, so a
    /// store written with one codec remains readable under another. Returns
    /// `None` for empty, unrecognized, truncated or non-UTF-8 input rather
    /// than erroring.
    pub fn decompress(&self, bytes: &[u8]) -> Option<String> {
        let (tag, body) = bytes.split_first()?;
        match *tag {
            FORMAT_PLAIN => String::from_utf8(body.to_vec()).ok(),
            FORMAT_DEFLATE => {
                let mut text = String::new();
                ZlibDecoder::new(body).read_to_string(&mut text).ok()?;
                Some(text)
            }
            _ => None,
        }
    }
}

fn encode_plain(text: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.push(FORMAT_PLAIN);
    buf.extend_from_slice(text.as_bytes());
    buf
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflate_round_trip() {
        let codec = Codec::Deflate;
        let text = "query state with some repetition repetition repetition";
        let encoded = codec.compress(text);
        assert_eq!(codec.decompress(&encoded).as_deref(), Some(text));
    }

    #[test]
    fn test_plain_round_trip() {
        let codec = Codec::Plain;
        let encoded = codec.compress("hello");
        assert_eq!(encoded[0], FORMAT_PLAIN);
        assert_eq!(codec.decompress(&encoded).as_deref(), Some("hello"));
    }

    #[test]
    fn test_empty_string_round_trip() {
        for codec in [Codec::Plain, Codec::Deflate] {
            let encoded = codec.compress("");
            assert_eq!(codec.decompress(&encoded).as_deref(), Some(""));
        }
    }

    #[test]
    fn test_unicode_round_trip() {
        let codec = Codec::Deflate;
        let text = "ключ → 値 → 🦀";
        let encoded = codec.compress(text);
        assert_eq!(codec.decompress(&encoded).as_deref(), Some(text));
    }

    #[test]
    fn test_cross_codec_decode() {
        // A store written with Plain must stay readable under Deflate and
        // vice versa: decoding follows the tag.
        let plain = Codec::Plain.compress("persisted earlier");
        let deflated = Codec::Deflate.compress("persisted earlier");
        assert_eq!(
            Codec::Deflate.decompress(&plain).as_deref(),
            Some("persisted earlier")
        );
        assert_eq!(
            Codec::Plain.decompress(&deflated).as_deref(),
            Some("persisted earlier")
        );
    }

    #[test]
    fn test_corrupt_input_returns_none() {
        let codec = Codec::Deflate;
        assert_eq!(codec.decompress(&[]), None);
        assert_eq!(codec.decompress(&[FORMAT_DEFLATE, 0xde, 0xad]), None);
        assert_eq!(codec.decompress(&[0x7f, 1, 2, 3]), None);
    }

    #[test]
    fn test_truncated_deflate_returns_none() {
        let codec = Codec::Deflate;
        let mut encoded = codec.compress("a longer payload that compresses to several bytes");
        encoded.truncate(encoded.len() / 2);
        assert_eq!(codec.decompress(&encoded), None);
    }

    #[test]
    fn test_plain_rejects_invalid_utf8() {
        let codec = Codec::Plain;
        assert_eq!(codec.decompress(&[FORMAT_PLAIN, 0xff, 0xfe]), None);
    }
}
