//! Requested avatar resolution.

use serde::{Deserialize, Serialize};

/// Resolution variant understood by the profile-image CDN.
///
/// Unknown or missing values fall back to [`SizeToken::Large`] (`400x400`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SizeToken {
    #[serde(rename = "mini")]
    Mini,
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "bigger")]
    Bigger,
    #[default]
    #[serde(rename = "400x400")]
    Large,
    #[serde(rename = "original")]
    Original,
}

impl SizeToken {
    pub const ALL: [SizeToken; 5] = [
        SizeToken::Mini,
        SizeToken::Normal,
        SizeToken::Bigger,
        SizeToken::Large,
        SizeToken::Original,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mini => "mini",
            Self::Normal => "normal",
            Self::Bigger => "bigger",
            Self::Large => "400x400",
            Self::Original => "original",
        }
    }

    /// Lenient parse used for query strings: anything unrecognized is the default.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse().ok()).unwrap_or_default()
    }
}

impl std::fmt::Display for SizeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SizeToken {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mini" => Ok(Self::Mini),
            "normal" => Ok(Self::Normal),
            "bigger" => Ok(Self::Bigger),
            "400x400" => Ok(Self::Large),
            "original" => Ok(Self::Original),
            _ => Err(format!("Invalid size: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_sizes() {
        for size in SizeToken::ALL {
            assert_eq!(size.as_str().parse::<SizeToken>().unwrap(), size);
        }
        assert_eq!("ORIGINAL".parse::<SizeToken>().unwrap(), SizeToken::Original);
    }

    #[test]
    fn test_parse_or_default() {
        assert_eq!(SizeToken::parse_or_default(None), SizeToken::Large);
        assert_eq!(SizeToken::parse_or_default(Some("huge")), SizeToken::Large);
        assert_eq!(SizeToken::parse_or_default(Some("")), SizeToken::Large);
        assert_eq!(SizeToken::parse_or_default(Some("mini")), SizeToken::Mini);
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&SizeToken::Large).unwrap();
        assert_eq!(json, "\"400x400\"");
        let parsed: SizeToken = serde_json::from_str("\"bigger\"").unwrap();
        assert_eq!(parsed, SizeToken::Bigger);
    }
}
