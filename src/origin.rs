//! Sender origin authorization.
//!
//! Every inbound message is checked here before anything else is looked at.
//! A configured pattern wins over an exact origin; with neither configured,
//! nothing is authorized.

use regex::Regex;
use url::Url;

/// Errors raised while building an [`OriginValidator`].
#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    /// The origin pattern is not a valid regular expression.
    #[error("invalid origin pattern '{pattern}': {source}")]
    InvalidPattern {
        /// Pattern as configured.
        pattern: String,
        /// Regex compilation error.
        source: regex::Error,
    },
    /// The exact origin is not a `scheme://host[:port]` origin.
    #[error("invalid origin '{origin}': {reason}")]
    InvalidOrigin {
        /// Origin as configured.
        origin: String,
        /// Why it was rejected.
        reason: String,
    },
}

#[derive(Debug, Clone)]
enum Rule {
    Pattern(Regex),
    Exact(String),
    DenyAll,
}

/// Decides whether a sender origin may issue commands.
#[derive(Debug, Clone)]
pub struct OriginValidator {
    rule: Rule,
}

impl OriginValidator {
    /// Authorize origins matching `pattern` anywhere (unanchored search).
    ///
    /// # Errors
    ///
    /// Returns [`OriginError::InvalidPattern`] if the pattern does not compile.
    pub fn pattern(pattern: &str) -> Result<Self, OriginError> {
        let regex = Regex::new(pattern).map_err(|source| OriginError::InvalidPattern {
            pattern: pattern.to_owned(),
            source,
        })?;
        Ok(Self {
            rule: Rule::Pattern(regex),
        })
    }

    /// Authorize exactly one origin.
    ///
    /// The origin is normalized (`HTTPS://Editor.Example.com:443` becomes
    /// `https://editor.example.com`), so it must not carry a path.
    ///
    /// # Errors
    ///
    /// Returns [`OriginError::InvalidOrigin`] if `origin` is not a tuple origin.
    pub fn exact(origin: &str) -> Result<Self, OriginError> {
        let invalid = |reason: String| OriginError::InvalidOrigin {
            origin: origin.to_owned(),
            reason,
        };
        let url = Url::parse(origin).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.path(), "" | "/") || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("origin must not contain a path, query or fragment".to_owned()));
        }
        let serialized = url.origin().ascii_serialization();
        if serialized == "null" {
            return Err(invalid("opaque origin".to_owned()));
        }
        Ok(Self {
            rule: Rule::Exact(serialized),
        })
    }

    /// Validator that authorizes nothing.
    pub fn deny_all() -> Self {
        Self {
            rule: Rule::DenyAll,
        }
    }

    /// Build from optional configuration; the pattern takes precedence.
    ///
    /// # Errors
    ///
    /// Propagates [`OriginValidator::pattern`] or [`OriginValidator::exact`]
    /// errors for whichever value governs.
    pub fn from_parts(pattern: Option<&str>, exact: Option<&str>) -> Result<Self, OriginError> {
        match (pattern, exact) {
            (Some(pattern), _) => Self::pattern(pattern),
            (None, Some(exact)) => Self::exact(exact),
            (None, None) => Ok(Self::deny_all()),
        }
    }

    /// Returns `true` if `origin` may issue commands.
    pub fn is_authorized(&self, origin: &str) -> bool {
        match &self.rule {
            Rule::Pattern(regex) => regex.is_match(origin),
            Rule::Exact(expected) => origin == expected,
            Rule::DenyAll => false,
        }
    }

    /// Human-readable description of the governing rule.
    pub fn describe(&self) -> String {
        match &self.rule {
            Rule::Pattern(regex) => format!("pattern {}", regex.as_str()),
            Rule::Exact(origin) => format!("exact {origin}"),
            Rule::DenyAll => "deny all".to_owned(),
        }
    }
}
