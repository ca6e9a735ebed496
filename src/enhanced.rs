use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::categorizer::{CategorizerStats, EventCategorizer, EventCategory};
use crate::character::{CharacterEventStream, DeathRecord, TimestampedEvent};
use crate::combat_periods::CombatPeriodDetector;
use crate::config::{CombatPeriodConfig, EnhancedConfig};
use crate::events::{ChallengeModeEvent, CombatEvent, EncounterEvent, EventRef};
use crate::models::{
    difficulty_name, seconds_between, CombatSegment, MobDeath, MythicPlusRun, RaidEncounter, Role, SegmentType,
    StreamMap,
};

/// Heroism and its equivalents.
pub const BLOODLUST_SPELLS: &[u32] = &[32182, 80353, 2825, 90355, 160452, 264667, 390386];

const TRASH_SEGMENT_NAME: &str = "Trash Pack";

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct EnhancedStats {
    pub total_events: u64,
    /// Largest number of characters tracked in one scope
    pub total_characters: usize,
    pub raid_encounters: usize,
    pub mythic_plus_runs: usize,
    pub categorizer: CategorizerStats,
}

/// Builds raid pulls and keystone runs with per-character streams.
#[derive(Debug, Default)]
pub struct EnhancedSegmenter {
    config: EnhancedConfig,
    detector: CombatPeriodDetector,
    categorizer: EventCategorizer,

    current_raid: Option<RaidEncounter>,
    raid_encounters: Vec<RaidEncounter>,
    raid_pull_counts: HashMap<u32, u32>,

    current_run: Option<MythicPlusRun>,
    current_segment: Option<CombatSegment>,
    runs: Vec<MythicPlusRun>,

    in_combat: bool,
    last_combat_event: Option<NaiveDateTime>,

    total_events: u64,
    total_characters: usize,
}

impl EnhancedSegmenter {
    pub fn new(config: EnhancedConfig, periods: CombatPeriodConfig) -> Self {
        EnhancedSegmenter {
            config,
            detector: CombatPeriodDetector::new(periods),
            ..Default::default()
        }
    }

    pub fn categorizer(&self) -> &EventCategorizer {
        &self.categorizer
    }

    pub fn current_raid(&self) -> Option<&RaidEncounter> {
        self.current_raid.as_ref()
    }

    pub fn current_run(&self) -> Option<&MythicPlusRun> {
        self.current_run.as_ref()
    }

    pub fn current_segment(&self) -> Option<&CombatSegment> {
        self.current_segment.as_ref()
    }

    pub fn raid_encounters(&self) -> &[RaidEncounter] {
        &self.raid_encounters
    }

    pub fn mythic_plus_runs(&self) -> &[MythicPlusRun] {
        &self.runs
    }

    pub fn process_event(&mut self, event: &EventRef) {
        self.total_events += 1;

        match event.as_ref() {
            CombatEvent::Encounter(encounter) if encounter.is_start() => {
                if self.current_run.is_some() {
                    self.start_boss_segment(event, encounter);
                } else {
                    self.start_raid(event, encounter);
                }
            }
            CombatEvent::Encounter(encounter) => {
                if self.current_run.is_some() {
                    self.end_boss_segment(event, encounter);
                } else {
                    self.end_raid(event, encounter);
                }
            }
            CombatEvent::ChallengeMode(challenge) if challenge.is_start() => self.start_run(event, challenge),
            CombatEvent::ChallengeMode(challenge) => self.end_run(event, challenge),
            _ => self.process_combat_event(event),
        }
    }

    fn process_combat_event(&mut self, event: &EventRef) {
        let timestamp = event.timestamp();
        let is_combat = self.detector.is_combat_event(event.event_type());

        // Leaving combat only ends trash; a boss segment waits for its end boundary.
        if self.current_run.is_some() && self.in_combat {
            if let Some(last) = self.last_combat_event {
                if seconds_between(last, timestamp) > self.config.combat_timeout_secs {
                    self.leave_combat(last);
                }
            }
        }
        if is_combat {
            self.in_combat = true;
            self.last_combat_event = Some(timestamp);
        }

        if let Some(raid) = self.current_raid.as_mut() {
            let tracked = ensure_characters(event, &mut raid.characters);
            self.total_characters = self.total_characters.max(tracked);
            self.categorizer.route_event(event, &mut raid.characters);
            track_raid_mechanics(raid, event);
            raid.events.push(event.clone());
            return;
        }

        if self.current_run.is_some() && self.current_segment.is_none() && is_combat {
            self.open_segment(SegmentType::Trash, TRASH_SEGMENT_NAME.to_string(), None, timestamp);
        }
        if let Some(segment) = self.current_segment.as_mut() {
            let tracked = ensure_characters(event, &mut segment.characters);
            self.total_characters = self.total_characters.max(tracked);
            self.categorizer.route_event(event, &mut segment.characters);
            track_mob_death(segment, event);
            segment.events.push(event.clone());
            return;
        }

        // Outside any scope: still learn pet ownership.
        self.categorizer.observe(event);
    }

    fn leave_combat(&mut self, last_combat: NaiveDateTime) {
        self.in_combat = false;
        if self
            .current_segment
            .as_ref()
            .is_some_and(|s| s.segment_type == SegmentType::Trash)
        {
            self.close_segment(Some(last_combat), None);
        }
    }

    fn start_raid(&mut self, event: &EventRef, encounter: &EncounterEvent) {
        if self.current_raid.is_some() {
            self.finalize_raid(None);
        }

        let pull = self.raid_pull_counts.entry(encounter.encounter_id).or_insert(0);
        *pull += 1;

        let raid = RaidEncounter {
            encounter_id: encounter.encounter_id,
            boss_name: encounter.encounter_name.clone(),
            difficulty: encounter.difficulty_id,
            difficulty_name: difficulty_name(encounter.difficulty_id),
            instance_id: encounter.instance_id,
            group_size: encounter.group_size,
            pull_number: *pull,
            start_time: event.timestamp(),
            end_time: None,
            success: false,
            combat_length: 0.0,
            characters: StreamMap::new(),
            events: vec![event.clone()],
            combat_periods: Vec::new(),
            raid_size: 0,
            tanks: Vec::new(),
            healers: Vec::new(),
            dps: Vec::new(),
            bloodlust_used: false,
            bloodlust_time: None,
            battle_resurrections: 0,
        };
        info!(
            "Started raid encounter: {} ({}, pull #{})",
            raid.boss_name, raid.difficulty_name, raid.pull_number
        );
        self.current_raid = Some(raid);
    }

    /// Only the end matching the open pull closes it.
    fn end_raid(&mut self, event: &EventRef, encounter: &EncounterEvent) {
        let Some(raid) = self
            .current_raid
            .as_mut()
            .filter(|r| r.encounter_id == encounter.encounter_id)
        else {
            return;
        };

        raid.success = encounter.success == Some(true);
        if let Some(ms) = encounter.duration_ms.filter(|&ms| ms > 0) {
            raid.combat_length = ms as f64 / 1000.0;
        }
        raid.events.push(event.clone());
        self.finalize_raid(Some(event.timestamp()));
    }

    fn finalize_raid(&mut self, end_time: Option<NaiveDateTime>) {
        let Some(mut raid) = self.current_raid.take() else {
            return;
        };

        let end = end_time
            .or_else(|| raid.events.last().map(|e| e.timestamp()))
            .unwrap_or(raid.start_time)
            .max(raid.start_time);
        raid.end_time = Some(end);
        if raid.combat_length <= 0.0 {
            raid.combat_length = seconds_between(raid.start_time, end);
        }

        raid.combat_periods = self.detector.detect(raid.events.iter().map(|e| e.as_ref()));
        for character in raid.characters.values_mut() {
            character.calculate_combat_metrics(&raid.combat_periods, raid.combat_length);
        }

        let (tanks, healers, dps) = composition(&raid.characters);
        raid.tanks = tanks;
        raid.healers = healers;
        raid.dps = dps;
        raid.raid_size = raid.characters.len();

        info!(
            "Ended raid encounter: {} ({}, {:.1}s, {} players)",
            raid.boss_name,
            if raid.success { "Kill" } else { "Wipe" },
            raid.combat_length,
            raid.raid_size
        );
        self.raid_encounters.push(raid);
    }

    fn start_run(&mut self, event: &EventRef, challenge: &ChallengeModeEvent) {
        self.finalize_raid(None);
        if self.current_run.is_some() {
            self.finalize_run(None);
        }

        let run = MythicPlusRun::new(
            challenge.instance_id,
            challenge.challenge_id,
            challenge.zone_name.clone(),
            challenge.keystone_level,
            challenge.affix_ids.clone(),
            event.timestamp(),
        );
        info!("Started Mythic+ run: {} +{}", run.dungeon_name, run.keystone_level);
        self.current_run = Some(run);
        self.in_combat = false;
        self.last_combat_event = None;
    }

    fn end_run(&mut self, event: &EventRef, challenge: &ChallengeModeEvent) {
        if self.current_run.is_none() {
            return;
        }
        self.finalize_run(Some((challenge, event.timestamp())));
    }

    fn start_boss_segment(&mut self, event: &EventRef, encounter: &EncounterEvent) {
        self.close_segment(None, None);
        self.open_segment(
            SegmentType::Boss,
            encounter.encounter_name.clone(),
            Some(encounter.encounter_id),
            event.timestamp(),
        );
    }

    fn end_boss_segment(&mut self, event: &EventRef, encounter: &EncounterEvent) {
        let matches = self
            .current_segment
            .as_ref()
            .is_some_and(|s| s.segment_type == SegmentType::Boss && s.encounter_id == Some(encounter.encounter_id));
        if matches {
            self.close_segment(Some(event.timestamp()), encounter.success);
        }
    }

    fn open_segment(
        &mut self,
        segment_type: SegmentType,
        name: String,
        encounter_id: Option<u32>,
        start_time: NaiveDateTime,
    ) {
        let Some(run) = self.current_run.as_ref() else {
            return;
        };
        let mut segment = CombatSegment::new(run.segments.len() + 1, segment_type, name, start_time);
        segment.encounter_id = encounter_id;
        debug!("Started M+ segment {}: {}", segment.segment_id, segment.name);
        self.current_segment = Some(segment);
    }

    /// Close the open segment at `end_time`, or at its last event.
    fn close_segment(&mut self, end_time: Option<NaiveDateTime>, success: Option<bool>) {
        let Some(mut segment) = self.current_segment.take() else {
            return;
        };
        let Some(run) = self.current_run.as_mut() else {
            return;
        };

        let end = end_time
            .or_else(|| segment.events.last().map(|e| e.timestamp()))
            .unwrap_or(segment.start_time)
            .max(segment.start_time);
        segment.end_time = Some(end);
        segment.duration = seconds_between(segment.start_time, end);
        segment.success = success;
        segment.enemy_forces_gained = segment.enemy_forces_end - segment.enemy_forces_start;

        segment.combat_periods = self.detector.detect(segment.events.iter().map(|e| e.as_ref()));
        for character in segment.characters.values_mut() {
            character.calculate_combat_metrics(&segment.combat_periods, segment.duration);
        }

        debug!(
            "Ended M+ segment {}: {} ({:.1}s, {} mobs)",
            segment.segment_id, segment.name, segment.duration, segment.mob_count
        );
        match segment.segment_type {
            SegmentType::Boss => run.boss_segments.push(segment.segment_id),
            SegmentType::Trash => run.trash_segments.push(segment.segment_id),
        }
        run.segments.push(segment);
    }

    fn finalize_run(&mut self, terminal: Option<(&ChallengeModeEvent, NaiveDateTime)>) {
        self.close_segment(terminal.map(|(_, at)| at), None);
        let Some(mut run) = self.current_run.take() else {
            return;
        };

        match terminal {
            Some((challenge, at)) => {
                run.end_time = Some(at);
                run.completed = challenge.success == Some(true);
                run.abandoned = !run.completed;
                run.official_time = challenge.duration_secs;
            }
            None => {
                run.end_time = Some(self.fallback_end(&run));
                run.abandoned = true;
            }
        }
        let end = run.end_time.unwrap_or(run.start_time);
        run.actual_time = seconds_between(run.start_time, end).max(0.0);
        run.in_time = run.time_limit_seconds.map(|limit| run.actual_time <= limit);

        run.overall_characters = aggregate_characters(&run.segments);
        run.deaths = run.overall_characters.values().map(|c| c.death_count).sum();
        run.combat_periods = self
            .detector
            .detect(run.segments.iter().flat_map(|s| s.events.iter().map(|e| e.as_ref())));
        for character in run.overall_characters.values_mut() {
            character.calculate_combat_metrics(&run.combat_periods, run.actual_time);
        }

        info!(
            "Ended Mythic+ run: {} +{} ({}, {:.1}s, {} segments)",
            run.dungeon_name,
            run.keystone_level,
            if run.completed { "Completed" } else { "Abandoned" },
            run.actual_time,
            run.segments.len()
        );
        self.runs.push(run);
        self.in_combat = false;
        self.last_combat_event = None;
    }

    /// End time for a run whose terminal boundary never arrived: the latest
    /// damage or healing a character saw, if it is plausibly part of this
    /// run, else the latest segment end. Without segments the run gets a
    /// fixed placeholder duration.
    fn fallback_end(&self, run: &MythicPlusRun) -> NaiveDateTime {
        let Some(latest_segment_end) = run.segments.iter().filter_map(|s| s.end_time).max() else {
            warn!(
                "Mythic+ run {} has no segments, using a {}s placeholder",
                run.dungeon_name, self.config.min_run_placeholder_secs
            );
            return run.start_time + seconds(self.config.min_run_placeholder_secs);
        };

        let last_combat = run
            .segments
            .iter()
            .flat_map(|s| s.characters.values())
            .filter_map(|c| {
                c.all_events
                    .iter()
                    .rev()
                    .find(|e| {
                        matches!(
                            e.category,
                            EventCategory::DamageDone | EventCategory::HealingDone | EventCategory::DamageTaken
                        )
                    })
                    .map(|e| e.timestamp)
            })
            .max();

        match last_combat {
            Some(at) if seconds_between(run.start_time, at) < self.config.plausible_session_secs => {
                debug!("Set M+ run end to last combat at {}", at);
                at
            }
            _ => {
                debug!("Set M+ run end to latest segment end at {}", latest_segment_end);
                latest_segment_end
            }
        }
    }

    /// Close everything still open at end of stream.
    pub fn finalize(&mut self) {
        self.finalize_raid(None);
        if self.current_run.is_some() {
            self.finalize_run(None);
        }
    }

    pub fn into_results(mut self) -> (Vec<RaidEncounter>, Vec<MythicPlusRun>) {
        self.finalize();
        (self.raid_encounters, self.runs)
    }

    pub fn stats(&self) -> EnhancedStats {
        EnhancedStats {
            total_events: self.total_events,
            total_characters: self.total_characters,
            raid_encounters: self.raid_encounters.len(),
            mythic_plus_runs: self.runs.len(),
            categorizer: self.categorizer.stats(),
        }
    }
}

fn seconds(secs: f64) -> Duration {
    Duration::milliseconds((secs * 1000.0).round() as i64)
}

/// Lazily create streams for the players an event names. Returns how many
/// the scope tracks.
fn ensure_characters(event: &CombatEvent, streams: &mut StreamMap) -> usize {
    let absorber = match event {
        CombatEvent::Absorb(absorb) => Some(&absorb.absorber),
        _ => None,
    };
    for unit in [Some(event.source()), Some(event.dest()), absorber].into_iter().flatten() {
        if !unit.is_player() {
            continue;
        }
        streams
            .entry(unit.guid.clone())
            .and_modify(|stream| {
                if stream.character_name.is_empty() && !unit.name.is_empty() {
                    stream.set_name(&unit.name);
                }
            })
            .or_insert_with(|| CharacterEventStream::new(&unit.guid, &unit.name));
    }

    // The snapshot arrives before the player acts.
    if let CombatEvent::CombatantInfo(info) = event {
        if info.player_guid.starts_with("Player-") {
            streams
                .entry(info.player_guid.clone())
                .or_insert_with(|| CharacterEventStream::new(&info.player_guid, ""));
        }
    }
    streams.len()
}

fn track_raid_mechanics(raid: &mut RaidEncounter, event: &CombatEvent) {
    match event.event_type() {
        "SPELL_CAST_SUCCESS" if !raid.bloodlust_used => {
            if event.spell_id().is_some_and(|id| BLOODLUST_SPELLS.contains(&id)) {
                raid.bloodlust_used = true;
                raid.bloodlust_time = Some(seconds_between(raid.start_time, event.timestamp()));
            }
        }
        "SPELL_RESURRECT" => raid.battle_resurrections += 1,
        _ => {}
    }
}

fn track_mob_death(segment: &mut CombatSegment, event: &CombatEvent) {
    if event.event_type() != "UNIT_DIED" {
        return;
    }
    let dest = event.dest();
    if dest.is_empty() || dest.is_player() || dest.is_pet() {
        return;
    }
    segment.mob_deaths.push(MobDeath {
        guid: dest.guid.clone(),
        name: dest.name.clone(),
        timestamp: event.timestamp(),
    });
    segment.mob_count += 1;
}

/// Character names by role, sorted.
fn composition(characters: &StreamMap) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut tanks = Vec::new();
    let mut healers = Vec::new();
    let mut dps = Vec::new();
    for character in characters.values() {
        let name = character.character_name.clone();
        match character.role {
            Some(Role::Tank) => tanks.push(name),
            Some(Role::Healer) => healers.push(name),
            Some(Role::Dps) => dps.push(name),
            None => {}
        }
    }
    tanks.sort();
    healers.sort();
    dps.sort();
    (tanks, healers, dps)
}

/// Rebuild run-wide streams by replaying every segment's events in time
/// order. Deaths are carried over as recorded.
fn aggregate_characters(segments: &[CombatSegment]) -> StreamMap {
    let mut by_guid: BTreeMap<&str, Vec<&CharacterEventStream>> = BTreeMap::new();
    for segment in segments {
        for (guid, stream) in &segment.characters {
            by_guid.entry(guid.as_str()).or_default().push(stream);
        }
    }

    let mut overall = StreamMap::new();
    for (guid, streams) in by_guid {
        let name = streams
            .iter()
            .map(|s| s.character_name.as_str())
            .find(|n| !n.is_empty())
            .unwrap_or_default();
        let mut combined = CharacterEventStream::new(guid, name);
        if let Some(spec_id) = streams.iter().find_map(|s| s.spec_id) {
            combined.set_spec(spec_id);
        }
        combined.item_level = streams.iter().find_map(|s| s.item_level);

        let mut events: Vec<&TimestampedEvent> = streams.iter().flat_map(|s| s.all_events.iter()).collect();
        events.sort_by_key(|e| e.timestamp);
        for event in events {
            combined.add_event(event.event.clone(), event.category);
        }

        let mut deaths: Vec<DeathRecord> = streams.iter().flat_map(|s| s.deaths.iter().cloned()).collect();
        deaths.sort_by_key(|d| d.timestamp);
        for death in deaths {
            combined.add_death(death);
        }

        overall.insert(guid.to_string(), combined);
    }
    overall
}
