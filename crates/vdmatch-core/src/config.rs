use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::Era;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "VDMATCH_CONFIG";

/// Every tunable of the matching pipeline.
///
/// Loaded from `config.toml`; each section and each field falls back to the
/// built-in default, so partial files are valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub limits: RetrievalLimits,
    #[serde(default)]
    pub era: EraPolicy,
    #[serde(default)]
    pub arbiter: ArbiterConfig,
}

/// Token selection rules for index expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Tokens shorter than this never reach the index (trigram floor).
    pub min_token_len: usize,
    /// Longest tokens joined with AND in the strict expression.
    pub strict_max_tokens: usize,
    /// Longest tokens joined with OR in the broad expression.
    pub broad_max_tokens: usize,
    pub rare_term_min_len: usize,
    pub rare_term_max: usize,
    /// Minimum normalized author length before the anonymous-work fallback runs.
    pub anonymous_min_author_len: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_token_len: 3,
            strict_max_tokens: 4,
            broad_max_tokens: 8,
            rare_term_min_len: 5,
            rare_term_max: 3,
            anonymous_min_author_len: 4,
        }
    }
}

/// Scores, bonuses and acceptance thresholds, all on the 0–100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub min_accept_score: f64,
    pub rare_term_accept_score: f64,
    /// The primary strategy re-runs with the broad expression when the best
    /// strict score stays below this value.
    pub broad_rerun_below: f64,

    pub year_bonus_exact: f64,
    pub year_bonus_close: f64,
    /// Year bonuses apply only above this text similarity.
    pub year_bonus_min_similarity: f64,
    pub year_penalty_cap: f64,
    /// Broad-pass year penalties apply only below this text similarity.
    pub year_penalty_max_similarity: f64,

    pub author_bonus: f64,
    pub author_min_similarity: f64,
    pub place_bonus: f64,
    pub place_min_similarity: f64,

    pub anonymous_bonus: f64,
    pub anonymous_min_title_similarity: f64,

    pub entity_bonus: f64,
    pub recent_era_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            min_accept_score: 50.0,
            rare_term_accept_score: 65.0,
            broad_rerun_below: 95.0,
            year_bonus_exact: 15.0,
            year_bonus_close: 5.0,
            year_bonus_min_similarity: 60.0,
            year_penalty_cap: 15.0,
            year_penalty_max_similarity: 92.0,
            author_bonus: 15.0,
            author_min_similarity: 90.0,
            place_bonus: 10.0,
            place_min_similarity: 85.0,
            anonymous_bonus: 30.0,
            anonymous_min_title_similarity: 90.0,
            entity_bonus: 5.0,
            recent_era_bonus: 5.0,
        }
    }
}

/// Row caps and year windows for index lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalLimits {
    pub primary_rows: u32,
    pub anonymous_rows: u32,
    pub entity_rows: u32,
    pub rare_term_rows: u32,
    /// Maximum year distance tolerated by the strict primary pass.
    pub strict_year_tolerance: u16,
    /// Half-width of the year window searched by the anonymous-work fallback.
    pub anonymous_year_window: u16,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            primary_rows: 500,
            anonymous_rows: 300,
            entity_rows: 200,
            rare_term_rows: 100,
            strict_year_tolerance: 1,
            anonymous_year_window: 3,
        }
    }
}

/// Era preferences applied during scoring and fusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EraPolicy {
    /// Citations dated after this year never resolve to `superseded`.
    #[serde(default = "default_boundary_year")]
    pub boundary_year: u16,
    #[serde(default = "default_recent_era")]
    pub recent: Era,
    #[serde(default = "default_superseded_era")]
    pub superseded: Era,
}

impl Default for EraPolicy {
    fn default() -> Self {
        Self {
            boundary_year: default_boundary_year(),
            recent: default_recent_era(),
            superseded: default_superseded_era(),
        }
    }
}

/// External arbiter settings. The API key itself is read from the
/// environment variable named by `api_key_env`, never from the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_arbiter_candidates")]
    pub max_candidates: usize,
    #[serde(default = "default_arbiter_model")]
    pub model: String,
    #[serde(default = "default_arbiter_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_arbiter_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_candidates: default_arbiter_candidates(),
            model: default_arbiter_model(),
            endpoint: default_arbiter_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_arbiter_timeout(),
            temperature: 0.0,
        }
    }
}

impl MatchConfig {
    /// Reject values that would silently disable the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        for (name, value) in [
            ("weights.min_accept_score", w.min_accept_score),
            ("weights.rare_term_accept_score", w.rare_term_accept_score),
            ("weights.broad_rerun_below", w.broad_rerun_below),
            ("weights.author_min_similarity", w.author_min_similarity),
            ("weights.place_min_similarity", w.place_min_similarity),
            ("weights.anonymous_min_title_similarity", w.anonymous_min_title_similarity),
        ] {
            if !(0.0..=100.0).contains(&value) {
                bail!("{name} must lie in [0, 100], got {value}");
            }
        }
        if self.planner.strict_max_tokens == 0 || self.planner.broad_max_tokens == 0 {
            bail!("planner token caps must be at least 1");
        }
        if self.era.recent == self.era.superseded {
            bail!("era.recent and era.superseded must differ");
        }
        Ok(())
    }
}

/// Pick the config file to read.
///
/// Precedence: explicit path → `$VDMATCH_CONFIG` → `<config_dir>/vdmatch/config.toml`.
/// Returns the path and whether it was requested explicitly (a missing
/// explicit file is an error, a missing default file is not).
fn resolve_config_path(
    explicit: Option<&Path>,
    env_value: Option<String>,
    config_dir: Option<PathBuf>,
) -> Option<(PathBuf, bool)> {
    if let Some(path) = explicit {
        return Some((path.to_path_buf(), true));
    }
    if let Some(value) = env_value.filter(|v| !v.trim().is_empty()) {
        return Some((PathBuf::from(value), true));
    }
    config_dir.map(|dir| (dir.join("vdmatch/config.toml"), false))
}

/// Load the matching configuration.
///
/// # Errors
///
/// Returns an error if an explicitly requested file is missing, if a file
/// cannot be read or parsed, or if the parsed values fail validation.
pub fn load_config(explicit: Option<&Path>) -> Result<MatchConfig> {
    let resolved = resolve_config_path(
        explicit,
        std::env::var(CONFIG_ENV).ok(),
        dirs::config_dir(),
    );

    let Some((path, required)) = resolved else {
        return Ok(MatchConfig::default());
    };

    if !path.exists() {
        if required {
            bail!("config file {} does not exist", path.display());
        }
        return Ok(MatchConfig::default());
    }

    let config = load_config_file(&path)?;
    tracing::debug!(path = %path.display(), "loaded match config");
    Ok(config)
}

/// Parse and validate one config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn load_config_file(path: &Path) -> Result<MatchConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<MatchConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    Ok(config)
}

const fn default_true() -> bool {
    true
}

const fn default_boundary_year() -> u16 {
    1700
}

const fn default_recent_era() -> Era {
    Era::Vd18
}

const fn default_superseded_era() -> Era {
    Era::Vd17
}

const fn default_arbiter_candidates() -> usize {
    25
}

fn default_arbiter_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_arbiter_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

const fn default_arbiter_timeout() -> u64 {
    60
}
