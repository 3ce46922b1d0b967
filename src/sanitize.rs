use crate::error::{Error, Result};

const BOM: char = '\u{feff}';

/// Decodes an uploaded file as UTF-8 and cleans it for parsing.
pub fn decode_upload(bytes: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(bytes)?;
    sanitize(text)
}

/// Strips a leading byte-order mark, folds CRLF/CR into `\n` and trims the text.
///
/// Returns [`Error::EmptyInput`] when nothing but whitespace remains.
pub fn sanitize(raw: &str) -> Result<String> {
    let without_bom = raw.strip_prefix(BOM).unwrap_or(raw);
    let unified = without_bom.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = unified.trim();

    if trimmed.is_empty() {
        return Err(Error::EmptyInput);
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bom_and_line_endings() {
        let cleaned = sanitize("\u{feff}Subject,Status\r\nOS,P\rCN,A\n").unwrap();
        assert_eq!(cleaned, "Subject,Status\nOS,P\nCN,A");
    }

    #[test]
    fn whitespace_only_is_empty_input() {
        assert!(matches!(sanitize(""), Err(Error::EmptyInput)));
        assert!(matches!(sanitize(" \r\n\t "), Err(Error::EmptyInput)));
        assert!(matches!(sanitize("\u{feff}\n"), Err(Error::EmptyInput)));
    }

    #[test]
    fn invalid_utf8_is_a_decoding_failure() {
        let bytes = [b'S', b'u', 0xff, 0xfe, b'\n'];
        assert!(matches!(decode_upload(&bytes), Err(Error::Decoding(_))));
    }

    #[test]
    fn decodes_valid_upload() {
        let cleaned = decode_upload("Subject,Date\r\nOS,2025-01-02\r\n".as_bytes()).unwrap();
        assert_eq!(cleaned, "Subject,Date\nOS,2025-01-02");
    }
}
