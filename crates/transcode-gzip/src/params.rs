//! Form-urlencoded parameter parsing and merging
//!
//! Pairs are split on `&`, then on the first `=`. Keys are always
//! percent-decoded. A value is decoded only when the `=` is followed by at
//! least one character; otherwise it is recorded as null (`None`), so both
//! `flag` and `empty=` yield a null value.
//!
//! Decoding failures are per pair: the pair is dropped, the error is logged
//! and collected, and parsing carries on with the next pair.

use encoding_rs::Encoding;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Values recorded for one parameter name, in order of appearance
pub type Values = Vec<Option<String>>;

/// A failure decoding a single parameter pair
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    /// `%` not followed by two more characters
    #[error("incomplete trailing escape (%) pattern at byte {position} in '{input}'")]
    IncompleteEscape {
        /// Raw component being decoded
        input: String,
        /// Byte offset of the `%`
        position: usize,
    },

    /// `%` followed by something other than two hex digits
    #[error("illegal hex characters in escape (%) pattern at byte {position} in '{input}'")]
    InvalidEscape {
        /// Raw component being decoded
        input: String,
        /// Byte offset of the `%`
        position: usize,
    },

    /// The charset needed to decode escaped bytes is unknown
    #[error("unsupported character encoding '{0}'")]
    UnsupportedCharset(String),
}

/// Decodes one raw key or value
pub trait FormDecoder: Send + Sync + fmt::Debug {
    /// Decode `component`, interpreting escaped bytes in `charset`
    fn decode(&self, component: &str, charset: &str) -> Result<String, ParamError>;
}

/// `application/x-www-form-urlencoded` decoding
///
/// `+` becomes a space and runs of `%XX` escapes are turned into bytes and
/// decoded with the given charset. The charset is only resolved when an
/// escape is actually present.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentDecoder;

impl FormDecoder for PercentDecoder {
    fn decode(&self, component: &str, charset: &str) -> Result<String, ParamError> {
        if !component.contains(['%', '+']) {
            return Ok(component.to_string());
        }

        let bytes = component.as_bytes();
        let mut out = String::with_capacity(component.len());
        let mut encoding: Option<&'static Encoding> = None;
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'+' => {
                    out.push(' ');
                    i += 1;
                }
                b'%' => {
                    let mut run = Vec::new();
                    while i < bytes.len() && bytes[i] == b'%' {
                        let pair = bytes.get(i + 1..i + 3).ok_or_else(|| ParamError::IncompleteEscape {
                            input: component.to_string(),
                            position: i,
                        })?;
                        let byte = hex_byte(pair).ok_or_else(|| ParamError::InvalidEscape {
                            input: component.to_string(),
                            position: i,
                        })?;
                        run.push(byte);
                        i += 3;
                    }

                    let encoding = match encoding {
                        Some(encoding) => encoding,
                        None => *encoding.insert(
                            Encoding::for_label(charset.trim().as_bytes())
                                .ok_or_else(|| ParamError::UnsupportedCharset(charset.to_string()))?,
                        ),
                    };
                    let (text, _) = encoding.decode_without_bom_handling(&run);
                    out.push_str(&text);
                }
                _ => {
                    let start = i;
                    while i < bytes.len() && bytes[i] != b'%' && bytes[i] != b'+' {
                        i += 1;
                    }
                    out.push_str(&component[start..i]);
                }
            }
        }

        Ok(out)
    }
}

fn hex_byte(pair: &[u8]) -> Option<u8> {
    let hi = (pair[0] as char).to_digit(16)?;
    let lo = (pair[1] as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

/// Mapping from parameter name to its ordered values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterMap {
    entries: HashMap<String, Values>,
}

impl ParameterMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`
    pub fn push(&mut self, key: impl Into<String>, value: Option<String>) {
        self.entries.entry(key.into()).or_default().push(value);
    }

    /// Append every entry of `other`, keeping `other`'s value order
    pub fn append(&mut self, other: &ParameterMap) {
        for (key, values) in &other.entries {
            self.entries
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    /// All values for `key`; `None` only when the key is absent
    pub fn get(&self, key: &str) -> Option<&[Option<String>]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// First value for `key`, if present and non-null
    pub fn first(&self, key: &str) -> Option<&str> {
        self.entries.get(key)?.first()?.as_deref()
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Parameter names
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over names and values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Option<String>])> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Detached copy with each value list frozen into a boxed slice
    pub fn snapshot(&self) -> HashMap<String, Box<[Option<String>]>> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().into_boxed_slice()))
            .collect()
    }
}

/// Parse `input` into `params`, collecting per-pair failures into `errors`
pub fn parse_into(
    params: &mut ParameterMap,
    input: &str,
    charset: &str,
    decoder: &dyn FormDecoder,
    errors: &mut Vec<ParamError>,
) {
    for pair in input.split('&') {
        if pair.is_empty() {
            continue;
        }

        let (raw_key, raw_value) = match pair.split_once('=') {
            Some((key, value)) => (key, Some(value).filter(|v| !v.is_empty())),
            None => (pair, None),
        };

        let decoded = decoder.decode(raw_key, charset).and_then(|key| {
            let value = raw_value.map(|v| decoder.decode(v, charset)).transpose()?;
            Ok((key, value))
        });

        match decoded {
            Ok((key, value)) => params.push(key, value),
            Err(e) => {
                warn!(pair = %pair, error = %e, "Skipping undecodable parameter");
                errors.push(e);
            }
        }
    }
}

/// Parse `input` into a fresh map
pub fn parse(input: &str, charset: &str, decoder: &dyn FormDecoder) -> (ParameterMap, Vec<ParamError>) {
    let mut params = ParameterMap::new();
    let mut errors = Vec::new();
    parse_into(&mut params, input, charset, decoder, &mut errors);
    (params, errors)
}

/// Query, content and merged parameter views of one request
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    query: ParameterMap,
    content: ParameterMap,
    merged: ParameterMap,
    errors: Vec<ParamError>,
}

impl Parameters {
    /// Parse both sources and merge them, query values first
    pub fn extract(
        query: Option<&str>,
        form: Option<&str>,
        charset: &str,
        decoder: &dyn FormDecoder,
    ) -> Self {
        let mut errors = Vec::new();

        let mut query_params = ParameterMap::new();
        if let Some(query) = query {
            parse_into(&mut query_params, query, charset, decoder, &mut errors);
        }

        let mut content_params = ParameterMap::new();
        if let Some(form) = form {
            parse_into(&mut content_params, form, charset, decoder, &mut errors);
        }

        let mut merged = ParameterMap::new();
        merged.append(&query_params);
        merged.append(&content_params);

        Self {
            query: query_params,
            content: content_params,
            merged,
            errors,
        }
    }

    /// Parameters parsed from the query string
    pub fn query(&self) -> &ParameterMap {
        &self.query
    }

    /// Parameters parsed from a form-encoded body
    pub fn content(&self) -> &ParameterMap {
        &self.content
    }

    /// Query and content parameters combined
    pub fn merged(&self) -> &ParameterMap {
        &self.merged
    }

    /// Pairs that could not be decoded
    pub fn errors(&self) -> &[ParamError] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(list: &[Option<&str>]) -> Values {
        list.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn test_null_values() {
        let (params, errors) = parse("k=v&flag&empty=", "UTF-8", &PercentDecoder);
        assert!(errors.is_empty());
        assert_eq!(params.get("k"), Some(&values(&[Some("v")])[..]));
        assert_eq!(params.get("flag"), Some(&values(&[None])[..]));
        assert_eq!(params.get("empty"), Some(&values(&[None])[..]));
        assert_eq!(params.first("flag"), None);
    }

    #[test]
    fn test_splits_on_first_equals() {
        let (params, _) = parse("expr=a=b", "UTF-8", &PercentDecoder);
        assert_eq!(params.first("expr"), Some("a=b"));
    }

    #[test]
    fn test_empty_pairs_skipped() {
        let (params, errors) = parse("&&a=1&&", "UTF-8", &PercentDecoder);
        assert!(errors.is_empty());
        assert_eq!(params.len(), 1);
        assert_eq!(params.first("a"), Some("1"));
    }

    #[test]
    fn test_duplicate_keys_accumulate() {
        let (params, _) = parse("b=2&b=3&b", "UTF-8", &PercentDecoder);
        assert_eq!(params.get("b"), Some(&values(&[Some("2"), Some("3"), None])[..]));
    }

    #[test]
    fn test_percent_and_plus_decoding() {
        let (params, _) = parse("na%6De=hello+w%C3%B6rld&q=a%2Bb", "UTF-8", &PercentDecoder);
        assert_eq!(params.first("name"), Some("hello wörld"));
        assert_eq!(params.first("q"), Some("a+b"));
    }

    #[test]
    fn test_declared_charset_used_for_escapes() {
        let (params, _) = parse("city=K%F6ln", "ISO-8859-1", &PercentDecoder);
        assert_eq!(params.first("city"), Some("Köln"));
    }

    #[test]
    fn test_malformed_pair_is_skipped() {
        let (params, errors) = parse("a=1&bad=%zz&c=%4&d=4", "UTF-8", &PercentDecoder);
        assert_eq!(params.first("a"), Some("1"));
        assert_eq!(params.first("d"), Some("4"));
        assert!(!params.contains_key("bad"));
        assert!(!params.contains_key("c"));
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ParamError::InvalidEscape { position: 0, .. }));
        assert!(matches!(errors[1], ParamError::IncompleteEscape { position: 0, .. }));
    }

    #[test]
    fn test_unknown_charset_only_fails_escaped_pairs() {
        let (params, errors) = parse("plain=yes&esc=%41", "x-unknown", &PercentDecoder);
        assert_eq!(params.first("plain"), Some("yes"));
        assert!(!params.contains_key("esc"));
        assert_eq!(errors, vec![ParamError::UnsupportedCharset("x-unknown".to_string())]);
    }

    #[test]
    fn test_merge_ordering() {
        let params = Parameters::extract(Some("a=1&b=2&b=3"), Some("b=4&c=5"), "UTF-8", &PercentDecoder);
        let merged = params.merged();

        assert_eq!(merged.get("a"), Some(&values(&[Some("1")])[..]));
        assert_eq!(merged.get("b"), Some(&values(&[Some("2"), Some("3"), Some("4")])[..]));
        assert_eq!(merged.get("c"), Some(&values(&[Some("5")])[..]));
        assert_eq!(params.query().len(), 2);
        assert_eq!(params.content().len(), 2);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut map = ParameterMap::new();
        map.push("a", Some("1".to_string()));
        let snapshot = map.snapshot();

        map.push("a", Some("2".to_string()));
        map.push("b", None);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["a"].len(), 1);
    }
}
