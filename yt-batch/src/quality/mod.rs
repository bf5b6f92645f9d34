//! Quality tiers and progressive format fallback.

use serde::{Deserialize, Serialize};

/// Desired resolution ceiling for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    /// Best available video and audio pair.
    #[serde(rename = "best")]
    Best,
    /// 1080p ceiling, falling back through 720p and 480p.
    #[serde(rename = "1080p")]
    P1080,
    /// 720p ceiling, falling back through 480p.
    #[serde(rename = "720p")]
    P720,
    /// 480p ceiling.
    #[serde(rename = "480p")]
    P480,
    /// Worst available pair, for the fastest possible download.
    #[serde(rename = "worst")]
    Worst,
}

impl Quality {
    /// Parses the user-facing tier name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "best" => Some(Self::Best),
            "1080p" | "1080" => Some(Self::P1080),
            "720p" | "720" => Some(Self::P720),
            "480p" | "480" => Some(Self::P480),
            "worst" => Some(Self::Worst),
            _ => None,
        }
    }

    /// The ordered fallback chain walked when probing availability, the
    /// requested tier first.
    pub fn fallback_chain(self) -> &'static [Quality] {
        match self {
            Self::P1080 => &[Self::P1080, Self::P720, Self::P480, Self::Best],
            Self::P720 => &[Self::P720, Self::P480, Self::Best],
            Self::P480 => &[Self::P480, Self::Best],
            Self::Best => &[Self::Best],
            Self::Worst => &[Self::Worst],
        }
    }

    /// The resolution ceiling in pixels, `None` for the open-ended tiers.
    pub fn height(self) -> Option<u32> {
        match self {
            Self::P1080 => Some(1080),
            Self::P720 => Some(720),
            Self::P480 => Some(480),
            Self::Best | Self::Worst => None,
        }
    }

    /// `best` and `worst` need no availability check and terminate a chain
    /// walk immediately.
    pub fn is_always_available(self) -> bool {
        matches!(self, Self::Best | Self::Worst)
    }

    /// The format-selector expression handed to `-f`.
    ///
    /// Each bounded tier encodes one extra fallback layer so a single
    /// invocation survives minor format absence without a second probe.
    pub fn format_expression(self) -> &'static str {
        match self {
            Self::Best => "bestvideo+bestaudio/best",
            Self::P1080 => {
                "bestvideo[height<=1080]+bestaudio/best[height<=1080]/bestvideo[height<=720]+bestaudio/best[height<=720]"
            }
            Self::P720 => {
                "bestvideo[height<=720]+bestaudio/best[height<=720]/bestvideo[height<=480]+bestaudio/best[height<=480]"
            }
            Self::P480 => "bestvideo[height<=480]+bestaudio/best[height<=480]/worst",
            Self::Worst => "worstvideo+worstaudio/worst",
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Best => "best",
            Self::P1080 => "1080p",
            Self::P720 => "720p",
            Self::P480 => "480p",
            Self::Worst => "worst",
        };
        write!(f, "{}", name)
    }
}

/// A concrete format choice for one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFormat {
    /// The tier that will actually be requested.
    pub tier: Quality,
    /// The format-selector expression for [`Self::tier`].
    pub expression: String,
    /// Whether the tier differs from what the user asked for, so the
    /// presentation layer can announce the downgrade.
    pub downgraded: bool,
}

impl ResolvedFormat {
    fn of(tier: Quality, requested: Quality) -> Self {
        Self {
            tier,
            expression: tier.format_expression().to_string(),
            downgraded: tier != requested,
        }
    }
}

/// Resolves a requested tier against a `--list-formats` dump.
///
/// Walks the tier's fallback chain and returns the first available entry.
/// A bounded tier counts as available when the dump contains a
/// case-insensitive `"<height>p"` or `"<height>x"` substring; this is the
/// same heuristic the probe output has always been matched with, kept
/// deliberately loose.
///
/// With no dump (probe failed or timed out) the requested tier is returned
/// unresolved and the download invocation negotiates on its own.
pub fn resolve(requested: Quality, formats_output: Option<&str>) -> ResolvedFormat {
    let Some(dump) = formats_output else {
        return ResolvedFormat::of(requested, requested);
    };

    let dump = dump.to_lowercase();
    for tier in requested.fallback_chain() {
        if tier.is_always_available() {
            return ResolvedFormat::of(*tier, requested);
        }

        if let Some(height) = tier.height() {
            if dump.contains(&format!("{}p", height)) || dump.contains(&format!("{}x", height)) {
                return ResolvedFormat::of(*tier, requested);
            }
        }
    }

    ResolvedFormat::of(Quality::Best, requested)
}
