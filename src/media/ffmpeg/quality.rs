use serde::{Deserialize, Serialize};

/// Named resolution/quality bucket supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    #[serde(rename = "4K")]
    Uhd,
    #[serde(rename = "1440p")]
    Qhd,
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "720p")]
    Hd,
    #[serde(rename = "480p")]
    Sd,
}

impl QualityTier {
    /// Case-insensitive; unknown names yield `None` and callers use the table default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "4k" | "2160p" | "uhd" => Some(Self::Uhd),
            "1440p" | "2k" | "qhd" => Some(Self::Qhd),
            "1080p" | "fhd" => Some(Self::FullHd),
            "720p" | "hd" => Some(Self::Hd),
            "480p" | "sd" => Some(Self::Sd),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uhd => "4K",
            Self::Qhd => "1440p",
            Self::FullHd => "1080p",
            Self::Hd => "720p",
            Self::Sd => "480p",
        }
    }
}

/// Fixed tier → value table with an explicit fallback entry.
#[derive(Debug)]
pub struct QualityTable<T: 'static> {
    pub entries: &'static [(QualityTier, T)],
    pub default: T,
}

impl<T: Copy> QualityTable<T> {
    pub fn lookup(&self, quality: &str) -> T {
        QualityTier::parse(quality)
            .and_then(|tier| {
                self.entries
                    .iter()
                    .find(|(key, _)| *key == tier)
                    .map(|(_, value)| *value)
            })
            .unwrap_or(self.default)
    }
}
