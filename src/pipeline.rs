use std::io::BufRead;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::enhanced::{EnhancedSegmenter, EnhancedStats};
use crate::error::PipelineResult;
use crate::events::EventRef;
use crate::models::{Fight, MythicPlusRun, RaidEncounter};
use crate::parser::{open_log, CombatLogParser, ParseError};
use crate::segmenter::{EncounterSegmenter, SegmenterStats};

/// What went wrong, and how much, during one pass.
#[derive(Debug, Serialize, Clone, Default)]
pub struct Diagnostics {
    pub lines_read: u64,
    pub events_processed: u64,
    pub parse_error_count: u64,
    pub parse_errors: Vec<ParseError>,
    pub categorization_errors: u64,
    pub segmenter: SegmenterStats,
    pub enhanced: EnhancedStats,
}

impl Diagnostics {
    /// Add another pass's counters. Segmenter stats are left to the caller
    /// since they depend on the merged fight list.
    pub fn absorb(&mut self, other: Diagnostics) {
        self.lines_read += other.lines_read;
        self.events_processed += other.events_processed;
        self.parse_error_count += other.parse_error_count;
        self.parse_errors.extend(other.parse_errors);
        self.categorization_errors += other.categorization_errors;

        let enhanced = &mut self.enhanced;
        enhanced.total_events += other.enhanced.total_events;
        enhanced.total_characters = enhanced.total_characters.max(other.enhanced.total_characters);
        enhanced.raid_encounters += other.enhanced.raid_encounters;
        enhanced.mythic_plus_runs += other.enhanced.mythic_plus_runs;
        enhanced.categorizer.events_processed += other.enhanced.categorizer.events_processed;
        enhanced.categorizer.categorization_errors += other.enhanced.categorizer.categorization_errors;
        enhanced.categorizer.tracked_pets += other.enhanced.categorizer.tracked_pets;
    }
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct PipelineOutput {
    pub fights: Vec<Fight>,
    pub raid_encounters: Vec<RaidEncounter>,
    pub mythic_plus_runs: Vec<MythicPlusRun>,
    pub diagnostics: Diagnostics,
}

impl PipelineOutput {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// One parser feeding both segmenters. Each instance owns its pet map and
/// error counters, so instances never share state.
pub struct CombatLogPipeline {
    parser: CombatLogParser,
    segmenter: EncounterSegmenter,
    enhanced: EnhancedSegmenter,
    events_processed: u64,
}

impl CombatLogPipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::starting_at(config, 0)
    }

    /// Pipeline for a slice of a log whose first line is `line_offset + 1`.
    pub fn starting_at(config: &PipelineConfig, line_offset: u64) -> Self {
        CombatLogPipeline {
            parser: CombatLogParser::starting_at(config.tokenizer.clone(), config.factory.clone(), line_offset),
            segmenter: EncounterSegmenter::new(config.segmenter.clone()),
            enhanced: EnhancedSegmenter::new(config.enhanced.clone(), config.combat_periods.clone()),
            events_processed: 0,
        }
    }

    pub fn parse_file(&mut self, path: &Path) -> PipelineResult<Vec<EventRef>> {
        self.parser.parse_file(path)
    }

    pub fn process_event(&mut self, event: &EventRef) {
        self.events_processed += 1;
        self.segmenter.process_event(event);
        self.enhanced.process_event(event);
    }

    /// Parse and process in one streaming pass, without holding every event.
    pub fn process_reader<R: BufRead>(&mut self, reader: R) -> PipelineResult<()> {
        let CombatLogPipeline {
            parser,
            segmenter,
            enhanced,
            events_processed,
        } = self;
        parser.for_each_event(reader, |event| {
            *events_processed += 1;
            segmenter.process_event(&event);
            enhanced.process_event(&event);
        })
    }

    pub fn finalize(mut self) -> PipelineOutput {
        self.segmenter.finalize();
        self.enhanced.finalize();

        let parser_stats = self.parser.stats();
        let enhanced = self.enhanced.stats();
        let diagnostics = Diagnostics {
            lines_read: parser_stats.lines_read,
            events_processed: self.events_processed,
            parse_error_count: parser_stats.parse_errors,
            parse_errors: self.parser.take_errors(),
            categorization_errors: enhanced.categorizer.categorization_errors,
            segmenter: self.segmenter.stats(),
            enhanced,
        };

        let fights = self.segmenter.into_fights();
        let (raid_encounters, mythic_plus_runs) = self.enhanced.into_results();
        info!(
            "Pipeline finished: {} events, {} fights, {} raid pulls, {} M+ runs, {} parse errors",
            diagnostics.events_processed,
            fights.len(),
            raid_encounters.len(),
            mythic_plus_runs.len(),
            diagnostics.parse_error_count
        );

        PipelineOutput {
            fights,
            raid_encounters,
            mythic_plus_runs,
            diagnostics,
        }
    }
}

pub fn run_reader<R: BufRead>(reader: R, config: &PipelineConfig) -> PipelineResult<PipelineOutput> {
    let mut pipeline = CombatLogPipeline::new(config);
    pipeline.process_reader(reader)?;
    Ok(pipeline.finalize())
}

pub fn run_file(path: &Path, config: &PipelineConfig) -> PipelineResult<PipelineOutput> {
    info!("Processing combat log {}", path.display());
    run_reader(open_log(path)?, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::models::FightType;

    const MAGE: &str = "Player-1111-0000000B";
    const BOSS: &str = "Creature-0-3133-2549-12345-209090-0000000001";

    fn build_line(time: &str, event_type: &str, fields: &[&str]) -> String {
        format!("9/18/2025 {}-4  {},{}", time, event_type, fields.join(","))
    }

    fn damage(time: &str, amount: &str) -> String {
        build_line(
            time,
            "SPELL_DAMAGE",
            &[
                MAGE, "\"Mage-Illidan-US\"", "0x511", "0x0", BOSS, "\"Gnarlroot\"", "0x10a48", "0x0", "133",
                "\"Fireball\"", "0x4", amount, "-1", "4", "0", "0", "0", "nil", "nil", "nil",
            ],
        )
    }

    fn sample_log() -> String {
        [
            build_line("19:59:59.000", "COMBAT_LOG_VERSION", &["22", "ADVANCED_LOG_ENABLED", "1"]),
            build_line("20:00:00.000", "ENCOUNTER_START", &["2820", "\"Gnarlroot\"", "16", "20", "2549"]),
            damage("20:00:01.000", "1000"),
            "garbage".to_string(),
            damage("20:00:02.000", "1500"),
            build_line("20:00:10.000", "ENCOUNTER_END", &["2820", "\"Gnarlroot\"", "16", "20", "1", "10000"]),
        ]
        .join("\n")
    }

    #[test]
    fn three_call_contract() {
        let config = PipelineConfig::default();
        let mut pipeline = CombatLogPipeline::new(&config);
        let events = CombatLogParser::default()
            .parse_reader(Cursor::new(sample_log()))
            .unwrap();
        for event in &events {
            pipeline.process_event(event);
        }
        let output = pipeline.finalize();

        assert_eq!(output.fights.len(), 1);
        assert_eq!(output.fights[0].fight_type, FightType::RaidBoss);
        assert_eq!(output.raid_encounters.len(), 1);
        assert_eq!(output.raid_encounters[0].characters[MAGE].total_damage_done, 2500);
        assert_eq!(output.diagnostics.events_processed, 5);
    }

    #[test]
    fn streaming_pass_reports_diagnostics() {
        let output = run_reader(Cursor::new(sample_log()), &PipelineConfig::default()).unwrap();

        let diagnostics = &output.diagnostics;
        assert_eq!(diagnostics.lines_read, 6);
        assert_eq!(diagnostics.events_processed, 5);
        assert_eq!(diagnostics.parse_error_count, 1);
        assert_eq!(diagnostics.parse_errors[0].line_number, 4);
        assert_eq!(diagnostics.segmenter.raid_boss, 1);
        assert_eq!(diagnostics.segmenter.successful_kills, 1);
        assert_eq!(diagnostics.enhanced.raid_encounters, 1);
        assert!(output.raid_encounters[0].success);

        let json = output.to_json_pretty().unwrap();
        assert!(json.contains("\"raid_encounters\""));
        assert!(json.contains("Gnarlroot"));
    }

    #[test]
    fn absorb_sums_counters() {
        let mut total = Diagnostics {
            lines_read: 10,
            parse_error_count: 1,
            ..Default::default()
        };
        let mut other = Diagnostics {
            lines_read: 5,
            parse_error_count: 2,
            categorization_errors: 3,
            ..Default::default()
        };
        other.enhanced.total_characters = 7;
        total.absorb(other);
        assert_eq!(total.lines_read, 15);
        assert_eq!(total.parse_error_count, 3);
        assert_eq!(total.categorization_errors, 3);
        assert_eq!(total.enhanced.total_characters, 7);
    }
}
