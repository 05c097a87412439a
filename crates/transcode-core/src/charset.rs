//! Character encoding lookup

use crate::{Error, Result};
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use std::borrow::Cow;

/// Charset used when a request or response declares none
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// Resolve a charset label (e.g. `UTF-8`, `iso-8859-1`, `latin1`)
pub fn resolve(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| Error::UnsupportedCharset(label.to_string()))
}

/// Resolve a declared charset, falling back to UTF-8 when none is declared
pub fn resolve_or_default(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(label) => resolve(label),
        None => Ok(encoding_rs::UTF_8),
    }
}

/// Check that text can be written out in `encoding`
///
/// encoding_rs substitutes UTF-8 when encoding into UTF-16 or the
/// replacement encoding. UTF-16 is encoded by [`encode`]; anything else
/// whose output encoding differs is rejected.
pub fn for_output(encoding: &'static Encoding) -> Result<&'static Encoding> {
    if encoding == UTF_16BE || encoding == UTF_16LE || encoding.output_encoding() == encoding {
        Ok(encoding)
    } else {
        Err(Error::UnsupportedCharset(encoding.name().to_string()))
    }
}

/// Resolve a charset label for writing text
pub fn resolve_output(label: &str) -> Result<&'static Encoding> {
    for_output(resolve(label)?)
}

/// Encode `text` in `encoding`, without a byte order mark
///
/// Unmappable characters become HTML numeric character references.
pub fn encode<'a>(encoding: &'static Encoding, text: &'a str) -> Cow<'a, [u8]> {
    if encoding == UTF_16BE {
        Cow::Owned(text.encode_utf16().flat_map(u16::to_be_bytes).collect())
    } else if encoding == UTF_16LE {
        Cow::Owned(text.encode_utf16().flat_map(u16::to_le_bytes).collect())
    } else {
        encoding.encode(text).0
    }
}

/// Extract the `charset` parameter from a content type value
pub fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then_some(value)
        } else {
            None
        }
    })
}
