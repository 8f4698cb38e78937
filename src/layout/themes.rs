//! Theme buckets used to group team boxes on the canvas.

use serde::Serialize;
use std::fmt;

/// A layout-only grouping of teams, in drawing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Steering,
    Data,
    Platform,
    DigitalServices,
}

impl Theme {
    /// Themes in the order they are laid out.
    pub const ORDER: [Theme; 4] = [
        Theme::Steering,
        Theme::Data,
        Theme::Platform,
        Theme::DigitalServices,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Theme::Steering => "Steering",
            Theme::Data => "Data",
            Theme::Platform => "Platform",
            Theme::DigitalServices => "Digital Services",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Theme::Steering => &["pilot", "pmo", "gouvern", "steer", "transverse"],
            Theme::Data => &["data", "donn", "analytic", "report", "bi"],
            Theme::Platform => &[
                "infra",
                "platform",
                "plateforme",
                "cloud",
                "ops",
                "secur",
                "reseau",
                "network",
            ],
            Theme::DigitalServices => &[],
        }
    }

    /// Bucket a team by name. The first theme with a matching keyword wins.
    ///
    /// Two-letter keywords only match whole words ("BI" but not "Mobile").
    pub fn classify(team_name: &str) -> Theme {
        let folded = fold(team_name);
        let words: Vec<&str> = folded
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let matches = |keyword: &&str| {
            if keyword.len() <= 2 {
                words.contains(keyword)
            } else {
                folded.contains(keyword)
            }
        };
        Theme::ORDER
            .into_iter()
            .find(|theme| theme.keywords().iter().any(matches))
            .unwrap_or(Theme::DigitalServices)
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// Lowercase with common Latin accents stripped.
fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'â' | 'ä' | 'á' | 'ã' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' | 'í' | 'ì' => 'i',
            'ô' | 'ö' | 'ó' | 'ò' | 'õ' => 'o',
            'ù' | 'û' | 'ü' | 'ú' => 'u',
            'ç' => 'c',
            'ÿ' => 'y',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Theme::classify("PMO & Pilotage"), Theme::Steering);
        assert_eq!(Theme::classify("Team Données"), Theme::Data);
        assert_eq!(Theme::classify("Reporting Analytics"), Theme::Data);
        assert_eq!(Theme::classify("Plateforme Cloud"), Theme::Platform);
        assert_eq!(Theme::classify("Réseau"), Theme::Platform);
        assert_eq!(Theme::classify("Team Alpha"), Theme::DigitalServices);
    }

    #[test]
    fn test_short_keyword_needs_whole_word() {
        assert_eq!(Theme::classify("Equipe BI"), Theme::Data);
        assert_eq!(Theme::classify("Mobile"), Theme::DigitalServices);
    }

    #[test]
    fn test_first_match_wins() {
        // both "data" and "platform" match; Data comes first
        assert_eq!(Theme::classify("Data Platform"), Theme::Data);
    }

    #[test]
    fn test_order_is_fixed() {
        let mut sorted = Theme::ORDER;
        sorted.sort();
        assert_eq!(sorted, Theme::ORDER);
        assert_eq!(Theme::DigitalServices.to_string(), "Digital Services");
    }
}
