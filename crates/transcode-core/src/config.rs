//! Transcoding configuration
//!
//! Configuration is an explicitly constructed value handed to whichever
//! component needs it. It can be built in code or loaded from YAML, TOML or
//! JSON, with `${VAR}` and `${VAR:-default}` environment expansion.

use crate::charset;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Transcoding configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeConfig {
    /// Gzip compression level (0-9)
    #[serde(default = "default_level")]
    pub level: u32,

    /// Charset standing in for the platform default decoding
    #[serde(default = "default_charset")]
    pub platform_charset: String,

    /// Charset declared on every dispatched response
    #[serde(default = "default_charset")]
    pub response_charset: String,

    /// Prefix stripped from request paths before dispatch
    #[serde(default)]
    pub context_path: String,

    /// Characters the text writer buffers before encoding them
    #[serde(default = "default_writer_buffer")]
    pub writer_buffer: usize,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            platform_charset: default_charset(),
            response_charset: default_charset(),
            context_path: String::new(),
            writer_buffer: default_writer_buffer(),
        }
    }
}

fn default_level() -> u32 {
    6
}

fn default_charset() -> String {
    charset::DEFAULT_CHARSET.to_string()
}

fn default_writer_buffer() -> usize {
    8192
}

impl TranscodeConfig {
    /// Check the configuration for values that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.level > 9 {
            return Err(Error::Config(format!(
                "gzip level must be between 0 and 9, got {}",
                self.level
            )));
        }

        charset::resolve_output(&self.platform_charset)
            .map_err(|_| Error::Config(format!("unsupported platform_charset '{}'", self.platform_charset)))?;
        charset::resolve_output(&self.response_charset)
            .map_err(|_| Error::Config(format!("unsupported response_charset '{}'", self.response_charset)))?;

        if !self.context_path.is_empty() && !self.context_path.starts_with('/') {
            return Err(Error::Config("context_path must start with '/'".to_string()));
        }

        Ok(())
    }

    /// The platform charset, resolved
    ///
    /// An unknown label falls back to UTF-8 with a warning; [`validate`]
    /// rejects it up front.
    ///
    /// [`validate`]: Self::validate
    pub fn platform_encoding(&self) -> &'static encoding_rs::Encoding {
        charset::resolve(&self.platform_charset).unwrap_or_else(|_| {
            tracing::warn!(
                charset = %self.platform_charset,
                "Unknown platform_charset, falling back to UTF-8"
            );
            encoding_rs::UTF_8
        })
    }

    /// Strip the context path from a request path
    pub fn strip_context<'a>(&self, path: &'a str) -> &'a str {
        if self.context_path.is_empty() {
            return path;
        }
        path.strip_prefix(self.context_path.as_str()).unwrap_or(path)
    }
}

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Config("Unable to detect config format".to_string()))?;

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => Err(Error::Config(format!("Unsupported config format: {other}"))),
        }
    }
}

/// Load configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<TranscodeConfig> {
    let path = path.as_ref();

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    let format = ConfigFormat::from_path(path)?;

    load_from_str(&content, format)
}

/// Load configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<TranscodeConfig> {
    let expanded = expand_env_vars(content)?;

    let config: TranscodeConfig = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse JSON: {e}")))?,
    };

    config.validate()?;
    tracing::debug!(?format, level = config.level, "Transcoding configuration loaded");

    Ok(config)
}

/// Expand `${VAR}` and `${VAR:-default}` references
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| Error::Config(format!("Invalid regex: {e}")))?;

    let mut result = String::with_capacity(content.len());
    let mut last_match = 0;

    for cap in re.captures_iter(content) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = match env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match default_value {
                Some(default) => default.to_string(),
                None => {
                    return Err(Error::Config(format!(
                        "Environment variable '{}' not set and no default provided",
                        var_name.as_str()
                    )));
                }
            },
        };

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&value);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_default_config() {
        let config = TranscodeConfig::default();
        assert_eq!(config.level, 6);
        assert_eq!(config.platform_charset, "UTF-8");
        assert_eq!(config.response_charset, "UTF-8");
        assert!(config.context_path.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml_with_defaults() {
        let config = load_from_str("level: 9\ncontext_path: /maptalks\n", ConfigFormat::Yaml).unwrap();
        assert_eq!(config.level, 9);
        assert_eq!(config.context_path, "/maptalks");
        assert_eq!(config.writer_buffer, 8192);
    }

    #[test]
    fn test_load_toml() {
        let config = load_from_str(
            "platform_charset = \"windows-1252\"\nresponse_charset = \"GBK\"\n",
            ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(config.platform_encoding(), encoding_rs::WINDOWS_1252);
        assert_eq!(config.response_charset, "GBK");
    }

    #[test]
    fn test_env_expansion_default() {
        let config = load_from_str(
            r#"{"level": ${TRANSCODE_TEST_UNSET_LEVEL:-3}}"#,
            ConfigFormat::Json,
        )
        .unwrap();
        assert_eq!(config.level, 3);
    }

    #[test]
    fn test_env_expansion_missing() {
        let err = load_from_str("level: ${TRANSCODE_TEST_NEVER_SET}", ConfigFormat::Yaml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = TranscodeConfig {
            level: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TranscodeConfig {
            platform_charset: "no-such-charset".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TranscodeConfig {
            context_path: "app".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unwritable_charset() {
        let config = TranscodeConfig {
            response_charset: "iso-2022-kr".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = TranscodeConfig {
            response_charset: "UTF-16BE".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_platform_charset_warns() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let config = TranscodeConfig {
            platform_charset: "utf-9".to_string(),
            ..Default::default()
        };

        let encoding = tracing::subscriber::with_default(subscriber, || config.platform_encoding());
        assert_eq!(encoding, encoding_rs::UTF_8);

        let output = logs.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains("utf-9"));
    }

    #[test]
    fn test_strip_context() {
        let config = TranscodeConfig {
            context_path: "/app".to_string(),
            ..Default::default()
        };
        assert_eq!(config.strip_context("/app/users/1"), "/users/1");
        assert_eq!(config.strip_context("/other"), "/other");
        assert_eq!(TranscodeConfig::default().strip_context("/x"), "/x");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "level: 1").unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.level, 1);
    }

    #[test]
    fn test_unknown_extension() {
        assert!(ConfigFormat::from_path(Path::new("transcode.ini")).is_err());
    }
}
