use serde::{Deserialize, Serialize};
use std::fmt;

/// The material families a catalyst band carries ratios for. Serialized as
/// the plain code string; unrecognised codes are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MaterialCode {
    Gelcoat,
    Resin,
    Topcoat,
    Other(String),
}

impl MaterialCode {
    /// Parses a free-form material code as found on legacy route cards.
    pub fn parse(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "gelcoat" | "gc" => MaterialCode::Gelcoat,
            "resin" | "rs" => MaterialCode::Resin,
            "topcoat" | "tc" => MaterialCode::Topcoat,
            _ => MaterialCode::Other(code.trim().to_string()),
        }
    }
}

impl From<String> for MaterialCode {
    fn from(code: String) -> Self {
        Self::parse(&code)
    }
}

impl From<MaterialCode> for String {
    fn from(code: MaterialCode) -> Self {
        code.to_string()
    }
}

impl fmt::Display for MaterialCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaterialCode::Gelcoat => write!(f, "gelcoat"),
            MaterialCode::Resin => write!(f, "resin"),
            MaterialCode::Topcoat => write!(f, "topcoat"),
            MaterialCode::Other(code) => write!(f, "{}", code),
        }
    }
}
