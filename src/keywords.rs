use crate::models::PriorityConfig;

pub const CRITICAL_POINTS: u32 = 40;
pub const HIGH_POINTS: u32 = 30;
pub const MEDIUM_POINTS: u32 = 20;
pub const URGENCY_POINTS: u32 = 10;

pub const URGENCY_WORDS: &[&str] = &[
    "urgent", "asap", "immediately", "critical", "emergency", "blocking", "showstopper",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Critical,
    High,
    Medium,
}

impl Tier {
    pub fn points(&self) -> u32 {
        match self {
            Self::Critical => CRITICAL_POINTS,
            Self::High => HIGH_POINTS,
            Self::Medium => MEDIUM_POINTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatch {
    pub keyword: String, // as written in the config
    pub tier: Tier,
}

impl KeywordMatch {
    pub fn points(&self) -> u32 {
        self.tier.points()
    }
}

/// First keyword found in `text`, scanning tiers critical -> high -> medium.
///
/// `text` is expected lower-cased already; keywords are lower-cased here so a
/// config written as "Data Loss" still matches. Containment is plain
/// substring search, so "error" also fires on "errors".
pub fn first_match(text: &str, config: &PriorityConfig) -> Option<KeywordMatch> {
    let tiers = [
        (Tier::Critical, &config.critical_keywords),
        (Tier::High, &config.high_keywords),
        (Tier::Medium, &config.medium_keywords),
    ];
    for (tier, keywords) in tiers {
        let hit = keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .find(|k| text.contains(&k.to_lowercase()));
        if let Some(keyword) = hit {
            return Some(KeywordMatch { keyword: keyword.clone(), tier });
        }
    }
    None
}

pub fn keyword_score(text: &str, config: &PriorityConfig) -> u32 {
    first_match(text, config).map(|m| m.points()).unwrap_or(0)
}

/// Urgency is its own signal family and stacks with the keyword tier.
pub fn urgency_score(text: &str) -> u32 {
    if URGENCY_WORDS.iter().any(|w| text.contains(w)) {
        URGENCY_POINTS
    } else {
        0
    }
}
