use serde::{Deserialize, Serialize};

use crate::error::PipelineResult;

/// Length of the advanced unit-state block some logging modes insert before
/// the type-specific payload.
pub const EXTENDED_BLOCK_LEN: usize = 19;
pub const RAID_DIFFICULTY_THRESHOLD: u32 = 14;
pub const TRASH_TIMEOUT_SECS: f64 = 10.0;
pub const MYTHIC_PLUS_COMBAT_TIMEOUT_SECS: f64 = 5.0;
pub const FALLBACK_GAP_SECS: f64 = 5.0;
pub const ADAPTIVE_MIN_GAP_SECS: f64 = 1.0;
pub const ADAPTIVE_MEDIAN_MULTIPLIER: f64 = 3.0;
/// Latest combat activity further than this from a run's start is not
/// trusted as the run's end.
pub const PLAUSIBLE_SESSION_SECS: f64 = 7200.0;
/// Duration given to a Mythic+ run that never produced a segment.
pub const MIN_RUN_PLACEHOLDER_SECS: f64 = 60.0;
pub const BASELINE_GCD_SECS: f64 = 1.5;
pub const DEFAULT_LOG_YEAR: i32 = 2024;
pub const PARSE_ERROR_TRUNCATE: usize = 100;

/// Top-level settings for one pipeline instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tokenizer: TokenizerConfig,
    pub factory: FactoryConfig,
    pub segmenter: SegmenterConfig,
    pub enhanced: EnhancedConfig,
    pub combat_periods: CombatPeriodConfig,
}

impl PipelineConfig {
    /// Parse overrides from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(input: &str) -> PipelineResult<Self> {
        Ok(toml::from_str(input)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Year assumed for old-style `M/D H:MM:SS.fff` timestamps.
    pub default_year: i32,
    pub extended_block_len: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        TokenizerConfig {
            default_year: DEFAULT_LOG_YEAR,
            extended_block_len: EXTENDED_BLOCK_LEN,
        }
    }
}

/// Which melee representation becomes a damage event. The other one is kept
/// as a plain base event so the same swing is never counted twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingRepresentation {
    #[default]
    SwingDamage,
    SwingDamageLanded,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    pub swing: SwingRepresentation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub trash_timeout_secs: f64,
    /// Encounters at or above this difficulty id are raid bosses.
    pub raid_difficulty_threshold: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        SegmenterConfig {
            trash_timeout_secs: TRASH_TIMEOUT_SECS,
            raid_difficulty_threshold: RAID_DIFFICULTY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancedConfig {
    pub combat_timeout_secs: f64,
    pub plausible_session_secs: f64,
    pub min_run_placeholder_secs: f64,
}

impl Default for EnhancedConfig {
    fn default() -> Self {
        EnhancedConfig {
            combat_timeout_secs: MYTHIC_PLUS_COMBAT_TIMEOUT_SECS,
            plausible_session_secs: PLAUSIBLE_SESSION_SECS,
            min_run_placeholder_secs: MIN_RUN_PLACEHOLDER_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatPeriodConfig {
    /// Fixed gap threshold. Takes precedence over adaptive mode.
    pub gap_threshold_secs: Option<f64>,
    pub adaptive: bool,
    pub adaptive_multiplier: f64,
    pub adaptive_min_secs: f64,
    pub fallback_gap_secs: f64,
    pub combat_types: Vec<String>,
    pub combat_suffixes: Vec<String>,
}

impl CombatPeriodConfig {
    pub fn fixed(gap_threshold_secs: f64) -> Self {
        CombatPeriodConfig {
            gap_threshold_secs: Some(gap_threshold_secs),
            ..CombatPeriodConfig::default()
        }
    }

    pub fn adaptive(multiplier: f64) -> Self {
        CombatPeriodConfig {
            gap_threshold_secs: None,
            adaptive: true,
            adaptive_multiplier: multiplier,
            ..CombatPeriodConfig::default()
        }
    }
}

impl Default for CombatPeriodConfig {
    fn default() -> Self {
        CombatPeriodConfig {
            gap_threshold_secs: None,
            adaptive: false,
            adaptive_multiplier: ADAPTIVE_MEDIAN_MULTIPLIER,
            adaptive_min_secs: ADAPTIVE_MIN_GAP_SECS,
            fallback_gap_secs: FALLBACK_GAP_SECS,
            combat_types: [
                "UNIT_DIED",
                "UNIT_DESTROYED",
                "SPELL_SUMMON",
                "SPELL_CREATE",
                "SPELL_INSTAKILL",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            combat_suffixes: [
                "_DAMAGE",
                "_HEAL",
                "_CAST_SUCCESS",
                "_CAST_START",
                "_INTERRUPT",
                "_DISPEL",
                "_STOLEN",
                "_AURA_APPLIED",
                "_AURA_REMOVED",
                "_AURA_REFRESH",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}
