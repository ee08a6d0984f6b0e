//! Session configuration
//!
//! Configuration is an explicit structure with an enumerated key set;
//! unknown keys and malformed values are rejected at the boundary
//! instead of being carried as loose string maps.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Recognized configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigKey {
    /// XSD version the validator targets: `1.0` or `1.1`.
    XsdVersion,
    /// Drop whitespace-only text nodes while parsing: `true`/`false`.
    StripWhitespace,
    /// Base URI for resolving relative references.
    BaseUri,
}

impl ConfigKey {
    pub fn parse(key: &str) -> Result<Self> {
        match key {
            "xsdversion" => Ok(ConfigKey::XsdVersion),
            "strip-whitespace" => Ok(ConfigKey::StripWhitespace),
            "base-uri" => Ok(ConfigKey::BaseUri),
            other => Err(Error::Config(format!(
                "unknown configuration key '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::XsdVersion => "xsdversion",
            ConfigKey::StripWhitespace => "strip-whitespace",
            ConfigKey::BaseUri => "base-uri",
        }
    }

    /// Validate a value for this key.
    pub fn check_value(&self, value: &str) -> Result<()> {
        let ok = match self {
            ConfigKey::XsdVersion => matches!(value, "1.0" | "1.1"),
            ConfigKey::StripWhitespace => matches!(value, "true" | "false"),
            ConfigKey::BaseUri => !value.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "invalid value '{}' for configuration key '{}'",
                value,
                self.as_str()
            )))
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration a session is acquired with.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Licensed sessions unlock schema validation.
    pub licensed: bool,
    /// Directory that relative file references resolve against.
    pub working_dir: Option<PathBuf>,
    properties: BTreeMap<ConfigKey, String>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn licensed(mut self, licensed: bool) -> Self {
        self.licensed = licensed;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set a property, validating key and value.
    pub fn set_property(&mut self, key: &str, value: &str) -> Result<()> {
        let key = ConfigKey::parse(key)?;
        key.check_value(value)?;
        self.properties.insert(key, value.to_string());
        Ok(())
    }

    /// Builder form of [`set_property`](Self::set_property).
    pub fn property(mut self, key: &str, value: &str) -> Result<Self> {
        self.set_property(key, value)?;
        Ok(self)
    }

    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        self.properties.get(&key).map(String::as_str)
    }

    /// Properties as string pairs, for processor-level inheritance.
    pub fn property_map(&self) -> BTreeMap<String, String> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_rejected() {
        let mut config = SessionConfig::new();
        assert!(matches!(
            config.set_property("no-such-key", "1"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn bad_value_rejected() {
        let mut config = SessionConfig::new();
        assert!(config.set_property("xsdversion", "2.0").is_err());
        assert!(config.set_property("xsdversion", "1.1").is_ok());
        assert_eq!(config.get(ConfigKey::XsdVersion), Some("1.1"));
    }

    #[test]
    fn builder_chain() {
        let config = SessionConfig::new()
            .licensed(true)
            .property("strip-whitespace", "true")
            .unwrap();
        assert!(config.licensed);
        assert_eq!(config.get(ConfigKey::StripWhitespace), Some("true"));
    }
}
