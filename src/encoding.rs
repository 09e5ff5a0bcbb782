use encoding_rs::Encoding;
use xhtmlchardet::detect;

use crate::error::{Error, Result};

// the encoding named by a byte order mark or declaration, UTF-8 otherwise
pub(crate) fn detect_encoding(data: &[u8], hint: Option<String>) -> Option<&'static Encoding> {
    let mut cursor = std::io::Cursor::new(data);
    let charsets = detect(&mut cursor, hint).ok()?;
    let label = charsets.first().map(String::as_str).unwrap_or("UTF-8");
    Encoding::for_label(label.as_bytes())
}

/// Decode loaded bytes to text.
pub(crate) fn decode(data: &[u8], hint: Option<String>) -> Result<String> {
    let encoding = detect_encoding(data, hint.clone())
        .ok_or_else(|| Error::Encoding(hint.unwrap_or_default()))?;
    let (text, used, had_errors) = encoding.decode(data);
    if had_errors {
        tracing::debug!(encoding = used.name(), "replaced malformed input");
    }
    Ok(text.into_owned())
}

/// Encode saved text. Characters the encoding can't represent become
/// character references.
pub(crate) fn encode(text: &str, encoding: &'static Encoding) -> Vec<u8> {
    if encoding == encoding_rs::UTF_8 {
        return text.as_bytes().to_vec();
    }
    let mut encoder = encoding.new_encoder();
    let mut out = Vec::with_capacity(text.len() + 16);
    let mut rest = text;
    loop {
        let capacity = encoder
            .max_buffer_length_from_utf8_without_replacement(rest.len())
            .unwrap_or(rest.len() * 4 + 16);
        let start = out.len();
        out.resize(start + capacity, 0);
        let (result, read, written) =
            encoder.encode_from_utf8_without_replacement(rest, &mut out[start..], true);
        out.truncate(start + written);
        rest = &rest[read..];
        match result {
            encoding_rs::EncoderResult::InputEmpty => break,
            encoding_rs::EncoderResult::OutputFull => {}
            encoding_rs::EncoderResult::Unmappable(c) => {
                out.extend_from_slice(format!("&#{};", c as u32).as_bytes());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>"[..], "UTF-8")]
    #[case(&b"<a/>"[..], "UTF-8")]
    // windows-1252 is a superset of both
    #[case(&b"<?xml version=\"1.0\" encoding=\"us-ascii\"?><a/>"[..], "windows-1252")]
    #[case(&b"<?xml version=\"1.0\" encoding=\"iso-8859-1\"?><a/>"[..], "windows-1252")]
    fn test_detect(#[case] data: &[u8], #[case] name: &str) {
        assert_eq!(detect_encoding(data, None).unwrap().name(), name);
    }

    #[test]
    fn test_decode_latin1() {
        let data = b"<?xml version=\"1.0\" encoding=\"iso-8859-1\"?><a>caf\xe9</a>";
        let text = decode(data, None).unwrap();
        assert!(text.ends_with("<a>caf\u{e9}</a>"));
    }

    #[test]
    fn test_encode_unmappable() {
        let bytes = encode("a\u{263a}b", encoding_rs::WINDOWS_1252);
        assert_eq!(bytes, b"a&#9786;b");
    }

    #[test]
    fn test_encode_utf8() {
        assert_eq!(encode("caf\u{e9}", encoding_rs::UTF_8), "caf\u{e9}".as_bytes());
    }
}
