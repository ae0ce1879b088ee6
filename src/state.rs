use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::archive::ReportArchive;
use crate::corpus::Corpus;
use crate::error::InterviewError;
use crate::eval::aggregate::BandBreakpoints;
use crate::eval::semantic::SemanticScorer;
use crate::eval::{Evaluator, ScoringWeights};
use crate::interview::selector::SelectionStrategy;
use crate::interview::session::{Event, InterviewSession};
use crate::llm::ChatBackend;

/// Interview parameters. Admins can modify them at runtime; running sessions
/// keep the snapshot they started with.
#[derive(Debug, Clone, PartialEq)]
pub struct InterviewConfig {
    pub question_count: usize,
    pub weights: ScoringWeights,
    /// Fuzzy keyword hit threshold, 0–100.
    pub keyword_threshold: f64,
    /// Threshold used when accuracy falls back to keyword coverage, 0–100.
    pub strict_keyword_threshold: f64,
    /// Prompt similarity at or above which a candidate counts as a repeat, 0–1.
    pub dedup_threshold: f64,
    pub semantic_enabled: bool,
    pub semantic_max_retries: u32,
    pub semantic_timeout: Duration,
    pub semantic_backoff: Duration,
    /// Largest distance a blended dimension may move from the deterministic score.
    pub blend_max_delta: f64,
    pub raise_tier_at: f64,
    pub lower_tier_at: f64,
    pub bands: BandBreakpoints,
    /// Word count past which answer length stops adding clarity.
    pub clarity_length_cap: usize,
    pub depth_per_hit: f64,
    pub selection: SelectionStrategy,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            question_count: 7,
            weights: ScoringWeights::default(),
            keyword_threshold: 68.0,
            strict_keyword_threshold: 80.0,
            dedup_threshold: 0.8,
            semantic_enabled: false,
            semantic_max_retries: 3,
            semantic_timeout: Duration::from_secs(20),
            semantic_backoff: Duration::from_millis(500),
            blend_max_delta: 1.5,
            raise_tier_at: 80.0,
            lower_tier_at: 40.0,
            bands: BandBreakpoints::default(),
            clarity_length_cap: 60,
            depth_per_hit: 1.0,
            selection: SelectionStrategy::Random,
        }
    }
}

/// Keys accepted by `InterviewConfig::set`.
pub const CONFIG_KEYS: &[&str] = &[
    "question_count",
    "w_acc",
    "w_comp",
    "w_clar",
    "w_depth",
    "keyword_threshold",
    "strict_keyword_threshold",
    "dedup_threshold",
    "semantic_enabled",
    "semantic_max_retries",
    "semantic_timeout_secs",
    "blend_max_delta",
    "raise_tier_at",
    "lower_tier_at",
    "clarity_length_cap",
    "selection",
];

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, InterviewError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| InterviewError::config(format!("`{}` has an unparseable value `{}`", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, InterviewError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(InterviewError::config(format!("`{}` expects true/false, got `{}`", key, value))),
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, InterviewError> {
    match dotenv::var(key) {
        Ok(v) if !v.trim().is_empty() => parse(key, &v),
        _ => Ok(default),
    }
}

impl InterviewConfig {
    /// Read the configuration from the environment. Semantic scoring defaults
    /// to on when a judge backend is available.
    pub fn from_env(judge_available: bool) -> Result<Self, InterviewError> {
        let d = Self::default();
        let semantic_requested = match dotenv::var("SEMANTIC_SCORING") {
            Ok(v) if !v.trim().is_empty() => parse_bool("SEMANTIC_SCORING", &v)?,
            _ => judge_available,
        };
        let deterministic_only = match dotenv::var("DETERMINISTIC_ONLY") {
            Ok(v) if !v.trim().is_empty() => parse_bool("DETERMINISTIC_ONLY", &v)?,
            _ => false,
        };

        let config = Self {
            question_count: env_or("NUM_QUESTIONS", d.question_count)?,
            weights: ScoringWeights {
                accuracy: env_or("W_ACC", d.weights.accuracy)?,
                completeness: env_or("W_COMP", d.weights.completeness)?,
                clarity: env_or("W_CLAR", d.weights.clarity)?,
                depth: env_or("W_DEPTH", d.weights.depth)?,
            },
            keyword_threshold: env_or("KW_HIT_THRESHOLD", d.keyword_threshold)?,
            strict_keyword_threshold: env_or("STRICT_KW_HIT_THRESHOLD", d.strict_keyword_threshold)?,
            dedup_threshold: env_or("DEDUP_THRESHOLD", d.dedup_threshold)?,
            semantic_enabled: semantic_requested && !deterministic_only && judge_available,
            semantic_max_retries: env_or("SEMANTIC_MAX_RETRIES", d.semantic_max_retries)?,
            semantic_timeout: Duration::from_secs(env_or("SEMANTIC_TIMEOUT_SECS", d.semantic_timeout.as_secs())?),
            semantic_backoff: Duration::from_millis(env_or(
                "SEMANTIC_BACKOFF_MS",
                d.semantic_backoff.as_millis() as u64,
            )?),
            blend_max_delta: env_or("BLEND_MAX_DELTA", d.blend_max_delta)?,
            raise_tier_at: env_or("RAISE_TIER_AT", d.raise_tier_at)?,
            lower_tier_at: env_or("LOWER_TIER_AT", d.lower_tier_at)?,
            bands: BandBreakpoints {
                beginner_max: env_or("BAND_BEGINNER_MAX", d.bands.beginner_max)?,
                intermediate_max: env_or("BAND_INTERMEDIATE_MAX", d.bands.intermediate_max)?,
                advanced_max: env_or("BAND_ADVANCED_MAX", d.bands.advanced_max)?,
            },
            clarity_length_cap: env_or("CLARITY_LENGTH_CAP", d.clarity_length_cap)?,
            depth_per_hit: d.depth_per_hit,
            selection: env_or("SELECTION", d.selection)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InterviewError> {
        self.weights.validate()?;
        self.bands.validate()?;
        if self.question_count == 0 {
            return Err(InterviewError::config("question_count must be at least 1"));
        }
        for (name, v) in [
            ("keyword_threshold", self.keyword_threshold),
            ("strict_keyword_threshold", self.strict_keyword_threshold),
            ("raise_tier_at", self.raise_tier_at),
            ("lower_tier_at", self.lower_tier_at),
        ] {
            if !(0.0..=100.0).contains(&v) {
                return Err(InterviewError::config(format!("{} must be within [0, 100], got {}", name, v)));
            }
        }
        if !(0.0..=1.0).contains(&self.dedup_threshold) {
            return Err(InterviewError::config(format!(
                "dedup_threshold must be within [0, 1], got {}",
                self.dedup_threshold
            )));
        }
        if self.lower_tier_at >= self.raise_tier_at {
            return Err(InterviewError::config("lower_tier_at must be below raise_tier_at"));
        }
        if !(self.blend_max_delta.is_finite() && self.blend_max_delta >= 0.0) {
            return Err(InterviewError::config("blend_max_delta must be non-negative"));
        }
        if self.semantic_timeout.is_zero() {
            return Err(InterviewError::config("semantic timeout must be positive"));
        }
        if self.clarity_length_cap == 0 {
            return Err(InterviewError::config("clarity_length_cap must be at least 1"));
        }
        Ok(())
    }

    /// Change one value by name. The change is only kept if the result validates.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), InterviewError> {
        let mut next = self.clone();
        match key {
            "question_count" => next.question_count = parse(key, value)?,
            "w_acc" => next.weights.accuracy = parse(key, value)?,
            "w_comp" => next.weights.completeness = parse(key, value)?,
            "w_clar" => next.weights.clarity = parse(key, value)?,
            "w_depth" => next.weights.depth = parse(key, value)?,
            "keyword_threshold" => next.keyword_threshold = parse(key, value)?,
            "strict_keyword_threshold" => next.strict_keyword_threshold = parse(key, value)?,
            "dedup_threshold" => next.dedup_threshold = parse(key, value)?,
            "semantic_enabled" => next.semantic_enabled = parse_bool(key, value)?,
            "semantic_max_retries" => next.semantic_max_retries = parse(key, value)?,
            "semantic_timeout_secs" => next.semantic_timeout = Duration::from_secs(parse(key, value)?),
            "blend_max_delta" => next.blend_max_delta = parse(key, value)?,
            "raise_tier_at" => next.raise_tier_at = parse(key, value)?,
            "lower_tier_at" => next.lower_tier_at = parse(key, value)?,
            "clarity_length_cap" => next.clarity_length_cap = parse(key, value)?,
            "selection" => next.selection = parse(key, value)?,
            _ => {
                return Err(InterviewError::config(format!(
                    "unknown key `{}`; valid keys: {}",
                    key,
                    CONFIG_KEYS.join(", ")
                )))
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// Live sessions, one per Discord user. Each session sits behind its own lock
/// so a slow evaluation never blocks other users.
pub type SessionMap = RwLock<HashMap<u64, Arc<Mutex<InterviewSession>>>>;

pub struct AppState {
    pub corpus: Arc<Corpus>,
    pub judge: Option<Arc<dyn ChatBackend>>,
    pub archive: Arc<ReportArchive>,
    pub sessions: SessionMap,
    pub admin_ids: HashSet<u64>,
    pub config: Arc<RwLock<InterviewConfig>>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    /// Build a session from the current configuration snapshot.
    pub async fn new_session(&self) -> Result<InterviewSession, InterviewError> {
        let config = Arc::new(self.config.read().await.clone());
        let semantic = match (&self.judge, config.semantic_enabled) {
            (Some(backend), true) => Some(Arc::new(SemanticScorer::new(backend.clone(), &config))),
            _ => None,
        };
        let evaluator = Evaluator::new(config.clone(), semantic);
        InterviewSession::new(config, self.corpus.clone(), evaluator)
    }

    /// Start an interview for `user_id`. Returns `None` if one is already live.
    ///
    /// The session is built before the session map is locked, so a slow config
    /// lock never stalls other users.
    pub async fn open_session(&self, user_id: u64) -> Result<Option<Vec<Event>>, InterviewError> {
        if self.sessions.read().await.contains_key(&user_id) {
            return Ok(None);
        }
        let mut session = self.new_session().await?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&user_id) {
            return Ok(None);
        }
        let events = session.start()?;
        if !session.is_done() {
            sessions.insert(user_id, Arc::new(Mutex::new(session)));
        }
        Ok(Some(events))
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::fixtures::question;
    use crate::corpus::types::Tier;

    async fn app_state(dir: &std::path::Path) -> AppState {
        let corpus = Corpus::new(
            "Excel",
            vec![
                question("B1", Tier::Basic, "How do you freeze the top row?"),
                question("B2", Tier::Basic, "What does COUNTA count?"),
            ],
        )
        .unwrap();
        AppState {
            corpus: Arc::new(corpus),
            judge: None,
            archive: Arc::new(ReportArchive::new(dir).await.unwrap()),
            sessions: RwLock::new(HashMap::new()),
            admin_ids: HashSet::from([1]),
            config: Arc::new(RwLock::new(InterviewConfig::default())),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_session_does_not_hold_map_while_config_locked() {
        let dir = tempfile::tempdir().unwrap();
        let state = Arc::new(app_state(dir.path()).await);

        let config_guard = state.config.write().await;
        let opener = {
            let state = state.clone();
            tokio::spawn(async move { state.open_session(7).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The opener is parked on the config lock; the session map stays free.
        let free = tokio::time::timeout(Duration::from_secs(1), state.sessions.write()).await;
        assert!(free.is_ok());
        drop(free);
        drop(config_guard);

        let events = opener.await.unwrap().unwrap().unwrap();
        assert!(matches!(events[0], Event::Introduction(_)));
        assert!(state.sessions.read().await.contains_key(&7));
        assert!(state.is_admin(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_session_once_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path()).await;
        assert!(state.open_session(7).await.unwrap().is_some());
        assert!(state.open_session(7).await.unwrap().is_none());
        assert!(state.open_session(8).await.unwrap().is_some());
        assert_eq!(state.sessions.read().await.len(), 2);
    }

    #[test]
    fn test_default_config_valid() {
        assert!(InterviewConfig::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let c = InterviewConfig {
            keyword_threshold: 120.0,
            ..InterviewConfig::default()
        };
        assert!(matches!(c.validate(), Err(InterviewError::InvalidConfiguration(_))));

        let c = InterviewConfig {
            dedup_threshold: 1.5,
            ..InterviewConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_tier_thresholds_must_be_ordered() {
        let c = InterviewConfig {
            lower_tier_at: 90.0,
            ..InterviewConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_set_validates_before_commit() {
        let mut c = InterviewConfig::default();
        c.set("question_count", "4").unwrap();
        assert_eq!(c.question_count, 4);

        // Weights would no longer sum to 1.0.
        assert!(c.set("w_acc", "0.9").is_err());
        assert_eq!(c.weights, ScoringWeights::default());

        assert!(c.set("selection", "lowest_id").is_ok());
        assert_eq!(c.selection, SelectionStrategy::LowestId);
        assert!(c.set("nope", "1").is_err());
        assert!(c.set("semantic_enabled", "maybe").is_err());
    }
}
