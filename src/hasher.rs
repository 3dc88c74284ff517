//! File-name-safe encoding of identifiers and hash decoding of rendered artifacts.
//!
//! Trees and images are built on sample hashes so that arbitrary sample
//! identifiers never reach a Newick parser or a file name. Once an image is
//! drawn, hashes are swapped back for the original identifiers.

use std::fs;
use std::path::Path;

use ahash::AHashMap;

use crate::errors::Result;
use crate::types::LeafCatalog;

fn is_safe(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_')
}

/// Percent-encodes every byte outside `[A-Za-z0-9._-]`.
pub fn encode_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        if is_safe(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Inverse of `encode_name`. Malformed escapes are kept literally.
pub fn decode_name(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            if let Ok(b) = u8::from_str_radix(&encoded[i + 1..i + 3], 16) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Escapes text for inclusion in SVG/XML.
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// hash -> XML-safe original identifier
pub fn display_names(catalog: &LeafCatalog) -> AHashMap<String, String> {
    catalog
        .iter()
        .map(|(hash, info)| (hash.clone(), xml_escape(&info.original_id)))
        .collect()
}

/// Replaces every hash occurring in the character data of `text`; markup
/// between `<` and `>` is left alone. Each segment is scanned once and the
/// longest hash starting at a position wins, so inserted names are never
/// decoded again.
pub fn decode_text(names: &AHashMap<String, String>, text: &str) -> String {
    let mut hashes: Vec<&String> = names.keys().filter(|h| !h.is_empty()).collect();
    hashes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let decode_segment = |segment: &str, out: &mut String| {
        let mut pos = 0;
        while let Some(c) = segment[pos..].chars().next() {
            let rest = &segment[pos..];
            match hashes.iter().find(|h| rest.starts_with(h.as_str())) {
                Some(hash) => {
                    out.push_str(&names[*hash]);
                    pos += hash.len();
                }
                None => {
                    out.push(c);
                    pos += c.len_utf8();
                }
            }
        }
    };

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('<') {
        decode_segment(&rest[..open], &mut out);
        let close = rest[open..].find('>').map_or(rest.len(), |i| open + i + 1);
        out.push_str(&rest[open..close]);
        rest = &rest[close..];
    }
    decode_segment(rest, &mut out);
    out
}

/// Writes a copy of `src` with hashes replaced by original identifiers.
pub fn decode_file<P: AsRef<Path>, Q: AsRef<Path>>(
    names: &AHashMap<String, String>,
    src: P,
    dst: Q,
) -> Result<()> {
    let text = fs::read_to_string(src)?;
    fs::write(dst, decode_text(names, &text))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_name() {
        for name in ["ITS", "Group A/B", "tef1-α", "50%_done", "a%zz"] {
            let encoded = encode_name(name);
            assert!(encoded.bytes().all(|b| is_safe(b) || b == b'%'));
            assert_eq!(decode_name(&encoded), name);
        }
        assert_eq!(encode_name("Group A/B"), "Group%20A%2FB");
    }

    #[test]
    fn test_decode_text_prefers_longer_hashes() {
        let mut names = AHashMap::new();
        names.insert("HS1".to_string(), "first".to_string());
        names.insert("HS10".to_string(), "tenth &amp; last".to_string());
        let decoded = decode_text(&names, "<text>HS10</text><text>HS1</text>");
        assert_eq!(decoded, "<text>tenth &amp; last</text><text>first</text>");
    }

    #[test]
    fn test_decode_text_does_not_decode_twice() {
        let mut names = AHashMap::new();
        names.insert("HS1".to_string(), "HS2 y".to_string());
        names.insert("HS2".to_string(), "x".to_string());
        let decoded = decode_text(&names, "<text>HS1 HS2</text><text>HS2</text>");
        assert_eq!(decoded, "<text>HS2 y x</text><text>x</text>");
    }

    #[test]
    fn test_decode_text_leaves_markup_alone() {
        let mut names = AHashMap::new();
        names.insert("og".to_string(), "OG 1".to_string());
        let decoded = decode_text(&names, "<polygon points=\"0,0\"/><text x=\"1\">og, og</text>\n");
        assert_eq!(decoded, "<polygon points=\"0,0\"/><text x=\"1\">OG 1, OG 1</text>\n");
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a<b & 'c'"), "a&lt;b &amp; &apos;c&apos;");
    }
}
