use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::FightType;
use crate::pipeline::{CombatLogPipeline, PipelineOutput};
use crate::segmenter::SegmenterStats;

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    MythicPlus,
    Encounter,
    /// Whatever lies between two scopes
    Gap,
}

/// A byte range of the log that can be processed on its own.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: usize,
    pub end: usize,
    /// Lines before `start`
    pub first_line: u64,
    pub kind: ChunkKind,
}

/// Event type of a raw line: the text between the double space after the
/// timestamp and the first comma.
fn event_type_of(line: &[u8]) -> Option<&[u8]> {
    let sep = line.windows(2).position(|w| w == b"  ")?;
    let rest = &line[sep + 2..];
    let end = rest.iter().position(|&b| b == b',').unwrap_or(rest.len());
    Some(&rest[..end])
}

struct OpenChunk {
    start: usize,
    first_line: u64,
    kind: ChunkKind,
}

/// Split `bytes` on line boundaries into keystone runs, standalone
/// encounters and the gaps between them. A scope whose end never shows up
/// runs to the end of the input.
pub fn prescan_boundaries(bytes: &[u8]) -> Vec<ChunkRange> {
    let mut chunks = Vec::new();
    let mut open: Option<OpenChunk> = None;
    let mut gap_start = 0usize;
    let mut gap_line = 0u64;

    let push = |chunks: &mut Vec<ChunkRange>, start: usize, end: usize, first_line: u64, kind: ChunkKind| {
        if start < end {
            chunks.push(ChunkRange {
                start,
                end,
                first_line,
                kind,
            });
        }
    };

    let mut offset = 0usize;
    let mut line_index = 0u64;
    while offset < bytes.len() {
        let line_end = bytes[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| offset + p + 1)
            .unwrap_or(bytes.len());
        let event_type = event_type_of(&bytes[offset..line_end]);

        match (event_type, open.as_ref().map(|c| c.kind)) {
            (Some(b"CHALLENGE_MODE_START"), current) => {
                match current {
                    Some(_) => {
                        if let Some(chunk) = open.take() {
                            push(&mut chunks, chunk.start, offset, chunk.first_line, chunk.kind);
                        }
                    }
                    None => push(&mut chunks, gap_start, offset, gap_line, ChunkKind::Gap),
                }
                open = Some(OpenChunk {
                    start: offset,
                    first_line: line_index,
                    kind: ChunkKind::MythicPlus,
                });
            }
            (Some(b"CHALLENGE_MODE_END"), Some(ChunkKind::MythicPlus))
            | (Some(b"ENCOUNTER_END"), Some(ChunkKind::Encounter)) => {
                if let Some(chunk) = open.take() {
                    push(&mut chunks, chunk.start, line_end, chunk.first_line, chunk.kind);
                }
                gap_start = line_end;
                gap_line = line_index + 1;
            }
            (Some(b"ENCOUNTER_START"), None | Some(ChunkKind::Encounter)) => {
                match open.take() {
                    Some(chunk) => push(&mut chunks, chunk.start, offset, chunk.first_line, chunk.kind),
                    None => push(&mut chunks, gap_start, offset, gap_line, ChunkKind::Gap),
                }
                open = Some(OpenChunk {
                    start: offset,
                    first_line: line_index,
                    kind: ChunkKind::Encounter,
                });
            }
            _ => {}
        }

        offset = line_end;
        line_index += 1;
    }

    match open {
        Some(chunk) => push(&mut chunks, chunk.start, bytes.len(), chunk.first_line, chunk.kind),
        None => push(&mut chunks, gap_start, bytes.len(), gap_line, ChunkKind::Gap),
    }
    chunks
}

/// Process every chunk of the log on its own blocking worker and merge the
/// results in time order. Pets summoned before a chunk starts are not known
/// to that chunk's worker.
pub async fn run_file_parallel(path: &Path, config: &PipelineConfig) -> PipelineResult<PipelineOutput> {
    let bytes = Arc::new(tokio::fs::read(path).await?);
    let chunks = prescan_boundaries(&bytes);
    debug!("Split {} into {} chunks", path.display(), chunks.len());

    let mut handles = Vec::with_capacity(chunks.len());
    for chunk in chunks.iter().copied() {
        let bytes = Arc::clone(&bytes);
        let config = config.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let mut pipeline = CombatLogPipeline::starting_at(&config, chunk.first_line);
            pipeline.process_reader(&bytes[chunk.start..chunk.end])?;
            Ok::<_, PipelineError>(pipeline.finalize())
        }));
    }

    let mut outputs = Vec::with_capacity(handles.len());
    for handle in handles {
        let output = handle.await.map_err(|e| PipelineError::Worker(e.to_string()))??;
        outputs.push(output);
    }

    let merged = merge_outputs(outputs);
    info!(
        "Parallel pass over {} finished: {} chunks, {} fights, {} raid pulls, {} M+ runs",
        path.display(),
        chunks.len(),
        merged.fights.len(),
        merged.raid_encounters.len(),
        merged.mythic_plus_runs.len()
    );
    Ok(merged)
}

/// Concatenate worker outputs, order them by start time and renumber fight
/// ids and pull numbers as a single pass would have.
pub fn merge_outputs(outputs: Vec<PipelineOutput>) -> PipelineOutput {
    let mut merged = PipelineOutput::default();
    for output in outputs {
        merged.fights.extend(output.fights);
        merged.raid_encounters.extend(output.raid_encounters);
        merged.mythic_plus_runs.extend(output.mythic_plus_runs);
        merged.diagnostics.absorb(output.diagnostics);
    }

    merged.fights.sort_by_key(|f| f.start_time);
    let mut pulls: HashMap<u32, u32> = HashMap::new();
    for (index, fight) in merged.fights.iter_mut().enumerate() {
        fight.fight_id = index as u32 + 1;
        if matches!(fight.fight_type, FightType::RaidBoss | FightType::DungeonBoss) {
            if let Some(encounter_id) = fight.encounter_id {
                let pull = pulls.entry(encounter_id).or_insert(0);
                *pull += 1;
                fight.pull_number = Some(*pull);
            }
        }
    }

    merged.raid_encounters.sort_by_key(|r| r.start_time);
    let mut raid_pulls: HashMap<u32, u32> = HashMap::new();
    for raid in &mut merged.raid_encounters {
        let pull = raid_pulls.entry(raid.encounter_id).or_insert(0);
        *pull += 1;
        raid.pull_number = *pull;
    }

    merged.mythic_plus_runs.sort_by_key(|r| r.start_time);
    merged.diagnostics.parse_errors.sort_by_key(|e| e.line_number);
    merged.diagnostics.segmenter = SegmenterStats::from_fights(&merged.fights);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_line(time: &str, event_type: &str, fields: &[&str]) -> String {
        format!("9/18/2025 {}-4  {},{}\n", time, event_type, fields.join(","))
    }

    fn kinds(chunks: &[ChunkRange]) -> Vec<ChunkKind> {
        chunks.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn extracts_event_type() {
        assert_eq!(
            event_type_of(b"9/18/2025 20:00:00.000-4  SPELL_DAMAGE,Player-1"),
            Some(&b"SPELL_DAMAGE"[..])
        );
        assert_eq!(event_type_of(b"9/18 20:00:00.000  UNIT_DIED"), Some(&b"UNIT_DIED"[..]));
        assert_eq!(event_type_of(b"garbage"), None);
    }

    #[test]
    fn splits_runs_encounters_and_gaps() {
        let log = [
            build_line("20:00:00.000", "ZONE_CHANGE", &["2549", "\"Amirdrassil\"", "16"]),
            build_line("20:00:01.000", "ENCOUNTER_START", &["2820", "\"Gnarlroot\"", "16", "20", "2549"]),
            build_line("20:00:02.000", "SPELL_CAST_SUCCESS", &["x"]),
            build_line("20:00:03.000", "ENCOUNTER_END", &["2820", "\"Gnarlroot\"", "16", "20", "1", "2000"]),
            build_line("20:10:00.000", "CHALLENGE_MODE_START", &["\"The Dawnbreaker\"", "2662", "505", "12", "[]"]),
            build_line("20:10:05.000", "ENCOUNTER_START", &["2837", "\"Speaker\"", "8", "5", "2662"]),
            build_line("20:10:09.000", "ENCOUNTER_END", &["2837", "\"Speaker\"", "8", "5", "1", "4000"]),
            build_line("20:40:00.000", "CHALLENGE_MODE_END", &["2662", "1", "12", "1790000"]),
        ]
        .concat();
        let chunks = prescan_boundaries(log.as_bytes());

        assert_eq!(kinds(&chunks), vec![ChunkKind::Gap, ChunkKind::Encounter, ChunkKind::MythicPlus]);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[1].first_line, 1);
        assert_eq!(chunks[2].first_line, 4);
        assert_eq!(chunks[2].end, log.len());
        // contiguous cover of the input
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert!(log[chunks[1].start..chunks[1].end].ends_with("1,2000\n"));
    }

    #[test]
    fn unmatched_start_runs_to_eof() {
        let log = [
            build_line("20:00:00.000", "CHALLENGE_MODE_START", &["\"The Dawnbreaker\"", "2662", "505", "12", "[]"]),
            build_line("20:00:01.000", "SPELL_DAMAGE", &["x"]),
        ]
        .concat();
        let chunks = prescan_boundaries(log.as_bytes());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::MythicPlus);
        assert_eq!(chunks[0].end, log.len());
    }

    #[test]
    fn restarted_encounter_closes_previous_chunk() {
        let log = [
            build_line("20:00:00.000", "ENCOUNTER_START", &["2820", "\"Gnarlroot\"", "16", "20", "2549"]),
            build_line("20:05:00.000", "ENCOUNTER_START", &["2820", "\"Gnarlroot\"", "16", "20", "2549"]),
            build_line("20:05:01.000", "ENCOUNTER_END", &["2820", "\"Gnarlroot\"", "16", "20", "0", "1000"]),
            build_line("20:05:02.000", "SPELL_DAMAGE", &["x"]),
        ]
        .concat();
        let chunks = prescan_boundaries(log.as_bytes());
        assert_eq!(kinds(&chunks), vec![ChunkKind::Encounter, ChunkKind::Encounter, ChunkKind::Gap]);
        assert_eq!(chunks[1].first_line, 1);
        assert_eq!(chunks[2].first_line, 3);
    }

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(prescan_boundaries(b"").is_empty());
    }
}
