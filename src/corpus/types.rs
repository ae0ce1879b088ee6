use serde::{Deserialize, Serialize};

/// Stable question identifier. Content-derived (`q-<blake3 prefix>`) when the
/// bank does not provide one.
pub type QuestionId = String;

/// Ordered difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic,
    Intermediate,
    /// Older banks label scenario questions separately; they rank with advanced.
    #[serde(alias = "scenario")]
    Advanced,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Basic, Tier::Intermediate, Tier::Advanced];

    pub fn rank(self) -> u8 {
        match self {
            Tier::Basic => 0,
            Tier::Intermediate => 1,
            Tier::Advanced => 2,
        }
    }

    /// One step up, capped at `Advanced`.
    pub fn raised(self) -> Tier {
        match self {
            Tier::Basic => Tier::Intermediate,
            Tier::Intermediate | Tier::Advanced => Tier::Advanced,
        }
    }

    /// One step down, floored at `Basic`.
    pub fn lowered(self) -> Tier {
        match self {
            Tier::Advanced => Tier::Intermediate,
            Tier::Intermediate | Tier::Basic => Tier::Basic,
        }
    }

    pub fn within_one_step(self, other: Tier) -> bool {
        self.rank().abs_diff(other.rank()) <= 1
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::Intermediate => "intermediate",
            Tier::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One immutable corpus question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub id: QuestionId,
    pub tier: Tier,
    pub prompt: String,
    /// Terms whose coverage drives completeness.
    pub keywords: Vec<String>,
    /// Sub-concepts a correct answer should contain; drives accuracy.
    pub expected_elements: Vec<String>,
    /// Terms that signal depth beyond the basics.
    pub advanced_keywords: Vec<String>,
    pub model_answer: Option<String>,
}

/// On-disk question bank layout.
#[derive(Debug, Deserialize)]
pub(super) struct RawBank {
    #[serde(default)]
    pub topic: Option<String>,
    /// Topic-wide depth terms inherited by questions that define none.
    #[serde(default)]
    pub advanced_keywords: Vec<String>,
    pub questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawQuestion {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "tier")]
    pub level: Tier,
    pub prompt: String,
    #[serde(default, alias = "acceptable_terms")]
    pub keywords: Vec<String>,
    #[serde(default, alias = "concepts_required")]
    pub expected_elements: Vec<String>,
    #[serde(default)]
    pub advanced_keywords: Vec<String>,
    #[serde(default)]
    pub model_answer: Option<String>,
}
