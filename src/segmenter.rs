use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::config::SegmenterConfig;
use crate::events::{ChallengeModeEvent, CombatEvent, EncounterEvent, EventRef};
use crate::models::{seconds_between, Fight, FightMetadata, FightType};

/// Event types that never open or extend a fight.
const IGNORED_EVENTS: &[&str] = &["COMBAT_LOG_VERSION", "ZONE_CHANGE", "MAP_CHANGE"];

/// Any of these in the event type marks active combat for trash tracking.
const COMBAT_KEYWORDS: &[&str] = &["DAMAGE", "HEAL", "CAST", "AURA", "SUMMON"];

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SegmenterState {
    Idle,
    InEncounter,
    InTrash,
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct SegmenterStats {
    pub total_fights: usize,
    pub raid_boss: usize,
    pub dungeon_boss: usize,
    pub mythic_plus: usize,
    pub trash: usize,
    pub successful_kills: usize,
    pub wipes: usize,
    /// Boss and keystone fights closed without their end boundary
    pub incomplete: usize,
}

impl SegmenterStats {
    pub fn from_fights(fights: &[Fight]) -> Self {
        let count = |t: FightType| fights.iter().filter(|f| f.fight_type == t).count();
        SegmenterStats {
            total_fights: fights.len(),
            raid_boss: count(FightType::RaidBoss),
            dungeon_boss: count(FightType::DungeonBoss),
            mythic_plus: count(FightType::MythicPlus),
            trash: count(FightType::Trash),
            successful_kills: fights.iter().filter(|f| f.success == Some(true)).count(),
            wipes: fights.iter().filter(|f| f.success == Some(false)).count(),
            incomplete: fights
                .iter()
                .filter(|f| f.fight_type != FightType::Trash && f.success.is_none())
                .count(),
        }
    }
}

/// Splits the event stream into boss pulls, keystone runs and trash.
///
/// The trash timeout here only draws fight boundaries. Per-character
/// combat time is measured separately by the combat period detector.
#[derive(Debug, Default)]
pub struct EncounterSegmenter {
    config: SegmenterConfig,
    current_fight: Option<Fight>,
    current_challenge: Option<Fight>,
    fights: Vec<Fight>,
    fight_counter: u32,
    pull_counts: HashMap<u32, u32>,
    last_combat_time: Option<NaiveDateTime>,
}

impl EncounterSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        EncounterSegmenter {
            config,
            ..Default::default()
        }
    }

    pub fn state(&self) -> SegmenterState {
        match &self.current_fight {
            None => SegmenterState::Idle,
            Some(fight) if fight.fight_type == FightType::Trash => SegmenterState::InTrash,
            Some(_) => SegmenterState::InEncounter,
        }
    }

    pub fn current_fight(&self) -> Option<&Fight> {
        self.current_fight.as_ref()
    }

    pub fn current_challenge(&self) -> Option<&Fight> {
        self.current_challenge.as_ref()
    }

    pub fn fights(&self) -> &[Fight] {
        &self.fights
    }

    /// Feed one event. Returns the id of the fight this event closed, if any.
    pub fn process_event(&mut self, event: &EventRef) -> Option<u32> {
        match event.as_ref() {
            CombatEvent::Encounter(encounter) if encounter.is_start() => {
                self.on_encounter_start(event, encounter)
            }
            CombatEvent::Encounter(encounter) => self.on_encounter_end(event, encounter),
            CombatEvent::ChallengeMode(challenge) if challenge.is_start() => {
                self.on_challenge_start(event, challenge)
            }
            CombatEvent::ChallengeMode(challenge) => self.on_challenge_end(event, challenge),
            _ => self.on_combat_event(event),
        }
    }

    fn next_fight_id(&mut self) -> u32 {
        self.fight_counter += 1;
        self.fight_counter
    }

    fn close_current(&mut self, end_time: Option<NaiveDateTime>) -> Option<u32> {
        let mut fight = self.current_fight.take()?;
        fight.finalize(end_time);
        let id = fight.fight_id;
        debug!(
            "closed {:?} fight {} ({:.1}s, {} events)",
            fight.fight_type,
            id,
            fight.duration(),
            fight.events.len()
        );
        self.fights.push(fight);
        Some(id)
    }

    fn on_encounter_start(&mut self, event: &EventRef, encounter: &EncounterEvent) -> Option<u32> {
        let closed = self.close_current(None);

        let fight_type = if encounter.difficulty_id >= self.config.raid_difficulty_threshold {
            FightType::RaidBoss
        } else {
            FightType::DungeonBoss
        };
        let pull = self.pull_counts.entry(encounter.encounter_id).or_insert(0);
        *pull += 1;
        let pull_number = *pull;

        let mut fight = Fight::new(self.next_fight_id(), fight_type, event.timestamp());
        fight.encounter_id = Some(encounter.encounter_id);
        fight.encounter_name = Some(encounter.encounter_name.clone());
        fight.difficulty = Some(encounter.difficulty_id);
        fight.pull_number = Some(pull_number);
        fight.metadata = FightMetadata {
            group_size: Some(encounter.group_size),
            instance_id: Some(encounter.instance_id),
            ..Default::default()
        };
        fight.add_event(event.clone());
        if let Some(challenge) = self.current_challenge.as_mut() {
            challenge.add_event(event.clone());
        }
        debug!(
            "opened {:?} fight {}: {} pull {}",
            fight_type, fight.fight_id, encounter.encounter_name, pull_number
        );
        self.current_fight = Some(fight);

        closed
    }

    /// An end whose id does not match the open fight leaves it untouched.
    fn on_encounter_end(&mut self, event: &EventRef, encounter: &EncounterEvent) -> Option<u32> {
        let fight = self
            .current_fight
            .as_mut()
            .filter(|f| f.fight_type != FightType::Trash && f.encounter_id == Some(encounter.encounter_id));
        let Some(fight) = fight else {
            debug!(
                "ignoring ENCOUNTER_END for {} at line {}: no matching open fight",
                encounter.encounter_id,
                event.header().line_number
            );
            return None;
        };

        fight.add_event(event.clone());
        fight.success = encounter.success;
        fight.duration_secs = encounter.duration_ms.map(|ms| ms as f64 / 1000.0);
        if let Some(challenge) = self.current_challenge.as_mut() {
            challenge.add_event(event.clone());
        }
        self.close_current(Some(event.timestamp()))
    }

    fn on_challenge_start(&mut self, event: &EventRef, challenge: &ChallengeModeEvent) -> Option<u32> {
        let closed = self.close_current(None);
        if let Some(mut previous) = self.current_challenge.take() {
            previous.finalize(None);
            self.fights.push(previous);
        }

        let mut fight = Fight::new(self.next_fight_id(), FightType::MythicPlus, event.timestamp());
        fight.encounter_name = Some(challenge.zone_name.clone());
        fight.keystone_level = Some(challenge.keystone_level);
        fight.metadata = FightMetadata {
            instance_id: Some(challenge.instance_id),
            challenge_id: Some(challenge.challenge_id),
            affixes: challenge.affix_ids.clone(),
            ..Default::default()
        };
        fight.add_event(event.clone());
        debug!(
            "opened keystone fight {}: {} +{}",
            fight.fight_id, challenge.zone_name, challenge.keystone_level
        );
        self.current_challenge = Some(fight);

        closed
    }

    fn on_challenge_end(&mut self, event: &EventRef, challenge: &ChallengeModeEvent) -> Option<u32> {
        let mut fight = self.current_challenge.take()?;
        fight.add_event(event.clone());
        fight.success = challenge.success;
        fight.duration_secs = challenge.duration_secs;
        fight.finalize(Some(event.timestamp()));
        let id = fight.fight_id;
        debug!("closed keystone fight {} ({:.1}s)", id, fight.duration());
        self.fights.push(fight);
        Some(id)
    }

    fn on_combat_event(&mut self, event: &EventRef) -> Option<u32> {
        if IGNORED_EVENTS.contains(&event.event_type()) {
            return None;
        }

        let timestamp = event.timestamp();
        let is_combat = is_combat_event(event.event_type());
        let mut closed = None;

        if is_combat && self.state() == SegmenterState::InTrash {
            let timed_out = self
                .last_combat_time
                .is_some_and(|last| seconds_between(last, timestamp) > self.config.trash_timeout_secs);
            if timed_out {
                closed = self.close_current(None);
            }
        }

        if is_combat && self.current_fight.is_none() {
            let fight = Fight::new(self.next_fight_id(), FightType::Trash, timestamp);
            debug!("opened trash fight {}", fight.fight_id);
            self.current_fight = Some(fight);
        }

        if let Some(fight) = self.current_fight.as_mut() {
            fight.add_event(event.clone());
        }
        if let Some(challenge) = self.current_challenge.as_mut() {
            challenge.add_event(event.clone());
        }
        if is_combat {
            self.last_combat_time = Some(timestamp);
        }

        closed
    }

    /// Force-close anything still open. Fights come back in opening order.
    pub fn finalize(&mut self) -> &[Fight] {
        self.close_current(None);
        if let Some(mut challenge) = self.current_challenge.take() {
            challenge.finalize(None);
            self.fights.push(challenge);
        }
        self.fights.sort_by_key(|f| f.fight_id);
        &self.fights
    }

    pub fn into_fights(mut self) -> Vec<Fight> {
        self.finalize();
        self.fights
    }

    pub fn stats(&self) -> SegmenterStats {
        SegmenterStats::from_fights(&self.fights)
    }
}

pub fn is_combat_event(event_type: &str) -> bool {
    COMBAT_KEYWORDS.iter().any(|keyword| event_type.contains(keyword))
}
