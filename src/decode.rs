//! Charset handling for fetched and saved HTML
//!
//! Pages from Chinese sites are still often served as GBK or GB18030, so
//! bytes are decoded with the first charset that can be determined: byte
//! order mark, `Content-Type` header, `<meta charset>`, then detection.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use regex::Regex;
use std::sync::LazyLock;

/// How far into the document a `<meta charset>` declaration is looked for.
const META_SCAN_BYTES: usize = 1024;

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_.:-]+)"#).unwrap()
});

/// Decode an HTML document to UTF-8. Malformed sequences become U+FFFD.
pub fn decode_html(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = sniff_encoding(bytes, content_type);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!(encoding = used.name(), "replaced malformed bytes while decoding");
    }
    text.into_owned()
}

/// The encoding `decode_html` will use for `bytes`.
pub fn sniff_encoding(bytes: &[u8], content_type: Option<&str>) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    if let Some(encoding) = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return encoding;
    }
    if let Some(encoding) = meta_charset(bytes) {
        return encoding;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(META_SCAN_BYTES)]);
    let label = META_CHARSET.captures(&head)?.get(1)?.as_str().to_string();
    let encoding = Encoding::for_label(label.as_bytes())?;
    // A byte-level declaration cannot be UTF-16; browsers read it as UTF-8
    if encoding == UTF_16LE || encoding == UTF_16BE {
        return Some(UTF_8);
    }
    Some(encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{GBK, SHIFT_JIS};

    fn gbk(text: &str) -> Vec<u8> {
        GBK.encode(text).0.into_owned()
    }

    #[test]
    fn test_charset_from_content_type() {
        let bytes = gbk("<html><title>中文标题</title></html>");
        let html = decode_html(&bytes, Some("text/html; charset=GBK"));
        assert!(html.contains("中文标题"));
    }

    #[test]
    fn test_charset_param_is_found_among_others() {
        assert_eq!(
            charset_param("text/html; q=1; Charset=\"gb2312\""),
            Some("gb2312".to_string())
        );
        assert_eq!(charset_param("text/html"), None);
        assert_eq!(charset_param("text/html; charset="), None);
    }

    #[test]
    fn test_bom_wins_over_header() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("<p>naïve café</p>".as_bytes());
        let html = decode_html(&bytes, Some("text/html; charset=iso-8859-1"));
        assert_eq!(html, "<p>naïve café</p>");
    }

    #[test]
    fn test_meta_charset_without_header() {
        let bytes = gbk(
            r#"<html><head><meta http-equiv="Content-Type" content="text/html; charset=gb2312"></head><body>正文内容</body></html>"#,
        );
        assert_eq!(sniff_encoding(&bytes, Some("text/html")), GBK);
        assert!(decode_html(&bytes, None).contains("正文内容"));
    }

    #[test]
    fn test_meta_utf16_label_means_utf8() {
        let bytes = "<meta charset=\"utf-16\"><p>plain</p>".as_bytes();
        assert_eq!(sniff_encoding(bytes, None), UTF_8);
    }

    #[test]
    fn test_detects_undeclared_encoding() {
        let text = "日本語のテキストです。これは文字コードの自動判定のための文章です。";
        let (bytes, _, _) = SHIFT_JIS.encode(text);
        assert_eq!(decode_html(&bytes, None), text);
    }

    #[test]
    fn test_utf8_passes_through() {
        let html = "<p>知乎专栏</p>";
        assert_eq!(decode_html(html.as_bytes(), Some("text/html")), html);
    }
}
