//! Relay connection cursors: `base64("arrayconnection:<offset>")`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::global_id::GlobalIdError;

const PREFIX: &str = "arrayconnection:";

pub fn offset_to_cursor(offset: usize) -> String {
    STANDARD.encode(format!("{}{}", PREFIX, offset))
}

pub fn cursor_to_offset(cursor: &str) -> Result<usize, GlobalIdError> {
    let invalid = || GlobalIdError::InvalidCursor(cursor.to_string());
    let bytes = STANDARD.decode(cursor).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.strip_prefix(PREFIX)
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_format() {
        assert_eq!(offset_to_cursor(0), "YXJyYXljb25uZWN0aW9uOjA=");
        assert_eq!(cursor_to_offset("YXJyYXljb25uZWN0aW9uOjA=").unwrap(), 0);
        assert_eq!(cursor_to_offset(&offset_to_cursor(17)).unwrap(), 17);
    }

    #[test]
    fn test_invalid_cursor() {
        let foreign = STANDARD.encode("somethingelse:3");
        assert!(cursor_to_offset(&foreign).is_err());
        assert!(cursor_to_offset("%%%").is_err());
    }
}
