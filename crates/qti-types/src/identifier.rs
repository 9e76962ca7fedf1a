//! Identifiers and variable references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Reasons an identifier token is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier must not be empty")]
    Empty,
    #[error("identifier '{0}' must start with a letter or '_'")]
    InvalidStart(String),
    #[error("identifier '{text}' contains invalid character '{ch}' at position {position}")]
    InvalidChar {
        text: String,
        ch: char,
        position: usize,
    },
    #[error("variable reference '{0}' has more than one '.' separator")]
    TooManySegments(String),
}

/// A validated name token.
///
/// Cloning is cheap: the text is shared behind an `Arc<str>`, so the same
/// identifier can be used as a map key in many stores without copying.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(Arc<str>);

impl Identifier {
    /// Validate and create an identifier.
    ///
    /// The first character must be a letter or `_`; the rest may be letters,
    /// digits, `_` or `-`. The `.` character is reserved for dotted
    /// [`VariableRef`]s.
    pub fn new(text: impl AsRef<str>) -> Result<Self, IdentifierError> {
        let text = text.as_ref();
        let mut chars = text.chars();
        let first = chars.next().ok_or(IdentifierError::Empty)?;
        if !(first.is_alphabetic() || first == '_') {
            return Err(IdentifierError::InvalidStart(text.to_string()));
        }
        for (position, ch) in text.chars().enumerate().skip(1) {
            if !(ch.is_alphanumeric() || ch == '_' || ch == '-') {
                return Err(IdentifierError::InvalidChar {
                    text: text.to_string(),
                    ch,
                    position,
                });
            }
        }
        Ok(Self(Arc::from(text)))
    }

    /// Identifier for a built-in name known to be valid.
    pub fn from_static(text: &'static str) -> Self {
        debug_assert!(Self::new(text).is_ok(), "invalid built-in identifier {text}");
        Self(Arc::from(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identifier::new(value)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Identifier::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0.to_string()
    }
}

/// A reference to a variable from inside an expression.
///
/// Items only accept [`VariableRef::Local`]. Tests may also use the dotted
/// form `ITEMREF.VARIABLE`, which names that item ref's instance of the
/// item's variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum VariableRef {
    Local(Identifier),
    ItemVariable {
        item_ref: Identifier,
        variable: Identifier,
    },
}

impl VariableRef {
    /// Parse either `NAME` or `ITEMREF.NAME`.
    pub fn parse(text: &str) -> Result<Self, IdentifierError> {
        let mut parts = text.split('.');
        let first = parts.next().unwrap_or_default();
        match (parts.next(), parts.next()) {
            (None, _) => Ok(Self::Local(Identifier::new(first)?)),
            (Some(second), None) => Ok(Self::ItemVariable {
                item_ref: Identifier::new(first)?,
                variable: Identifier::new(second)?,
            }),
            (Some(_), Some(_)) => Err(IdentifierError::TooManySegments(text.to_string())),
        }
    }

    pub fn local(identifier: Identifier) -> Self {
        Self::Local(identifier)
    }

    pub fn is_dotted(&self) -> bool {
        matches!(self, Self::ItemVariable { .. })
    }
}

impl fmt::Display for VariableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "{id}"),
            Self::ItemVariable { item_ref, variable } => write!(f, "{item_ref}.{variable}"),
        }
    }
}
