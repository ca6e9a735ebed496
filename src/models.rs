use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::character::CharacterEventStream;
use crate::combat_periods::CombatPeriod;
use crate::events::{EventRef, Unit};

/// Per-scope character streams keyed by player GUID.
pub type StreamMap = HashMap<String, CharacterEventStream>;

const UNIT_TYPE_PET: u32 = 0x0000_1000;

/// Signed seconds from `start` to `end`, millisecond precision.
pub fn seconds_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FightType {
    RaidBoss,
    MythicPlus,
    DungeonBoss,
    Trash,
}

/// A unit seen during a fight
#[derive(Debug, Serialize, Clone)]
pub struct Participant {
    pub guid: String,
    pub name: String,
    pub first_seen: NaiveDateTime,
    pub last_seen: NaiveDateTime,
    pub is_player: bool,
    pub is_pet: bool,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct FightMetadata {
    pub group_size: Option<u32>,
    pub instance_id: Option<u32>,
    pub challenge_id: Option<u32>,
    pub affixes: Vec<u32>,
}

/// One segmented combat span: a boss pull, a key, or a trash cluster
#[derive(Debug, Serialize, Clone)]
pub struct Fight {
    pub fight_id: u32,
    pub fight_type: FightType,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub encounter_id: Option<u32>,
    pub encounter_name: Option<String>,
    pub difficulty: Option<u32>,
    pub keystone_level: Option<u32>,
    pub pull_number: Option<u32>,
    pub success: Option<bool>,
    pub duration_secs: Option<f64>,
    pub events: Vec<EventRef>,
    pub participants: BTreeMap<String, Participant>,
    pub metadata: FightMetadata,
}

impl Fight {
    pub fn new(fight_id: u32, fight_type: FightType, start_time: NaiveDateTime) -> Self {
        Fight {
            fight_id,
            fight_type,
            start_time,
            end_time: None,
            encounter_id: None,
            encounter_name: None,
            difficulty: None,
            keystone_level: None,
            pull_number: None,
            success: None,
            duration_secs: None,
            events: Vec::new(),
            participants: BTreeMap::new(),
            metadata: FightMetadata::default(),
        }
    }

    pub fn add_event(&mut self, event: EventRef) {
        let timestamp = event.timestamp();
        for unit in [event.source(), event.dest()] {
            self.track_participant(unit, timestamp);
        }
        self.events.push(event);
    }

    fn track_participant(&mut self, unit: &Unit, timestamp: NaiveDateTime) {
        if unit.is_empty() {
            return;
        }
        self.participants
            .entry(unit.guid.clone())
            .and_modify(|p| {
                p.last_seen = timestamp;
                if p.name.is_empty() {
                    p.name = unit.name.clone();
                }
            })
            .or_insert_with(|| Participant {
                guid: unit.guid.clone(),
                name: unit.name.clone(),
                first_seen: timestamp,
                last_seen: timestamp,
                is_player: unit.is_player(),
                is_pet: unit.is_pet() || unit.flags & UNIT_TYPE_PET != 0,
            });
    }

    /// Close the fight. Without an explicit end the last event's timestamp
    /// is used; without an explicit duration it is derived from the bounds.
    pub fn finalize(&mut self, end_time: Option<NaiveDateTime>) {
        let end = end_time
            .or(self.end_time)
            .or_else(|| self.events.last().map(|e| e.timestamp()))
            .unwrap_or(self.start_time);
        self.end_time = Some(end);
        if self.duration_secs.is_none() {
            self.duration_secs = Some(seconds_between(self.start_time, end).max(0.0));
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration_secs.unwrap_or_else(|| {
            let end = self
                .end_time
                .or_else(|| self.events.last().map(|e| e.timestamp()))
                .unwrap_or(self.start_time);
            seconds_between(self.start_time, end).max(0.0)
        })
    }

    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn player_count(&self) -> usize {
        self.participants.values().filter(|p| p.is_player).count()
    }
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tank,
    Healer,
    Dps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecInfo {
    pub class_name: &'static str,
    pub spec_name: &'static str,
    pub role: Role,
}

/// One attempt at a raid or dungeon boss outside a keystone run
#[derive(Debug, Serialize, Clone)]
pub struct RaidEncounter {
    pub encounter_id: u32,
    pub boss_name: String,
    pub difficulty: u32,
    pub difficulty_name: String,
    pub instance_id: u32,
    pub group_size: u32,
    /// 1-based, per boss within one pass
    pub pull_number: u32,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub success: bool,
    pub combat_length: f64,
    pub characters: StreamMap,
    pub events: Vec<EventRef>,
    pub combat_periods: Vec<CombatPeriod>,
    pub raid_size: usize,
    pub tanks: Vec<String>,
    pub healers: Vec<String>,
    pub dps: Vec<String>,
    pub bloodlust_used: bool,
    /// Seconds into the pull
    pub bloodlust_time: Option<f64>,
    pub battle_resurrections: u32,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    Boss,
    Trash,
}

#[derive(Debug, Serialize, Clone)]
pub struct MobDeath {
    pub guid: String,
    pub name: String,
    pub timestamp: NaiveDateTime,
}

/// A boss or trash span inside a keystone run
#[derive(Debug, Serialize, Clone)]
pub struct CombatSegment {
    pub segment_id: usize,
    pub segment_type: SegmentType,
    pub name: String,
    pub encounter_id: Option<u32>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub duration: f64,
    pub success: Option<bool>,
    pub characters: StreamMap,
    pub events: Vec<EventRef>,
    pub combat_periods: Vec<CombatPeriod>,
    pub mob_deaths: Vec<MobDeath>,
    pub mob_count: usize,
    pub enemy_forces_start: f64,
    pub enemy_forces_end: f64,
    pub enemy_forces_gained: f64,
}

impl CombatSegment {
    pub fn new(
        segment_id: usize,
        segment_type: SegmentType,
        name: String,
        start_time: NaiveDateTime,
    ) -> Self {
        CombatSegment {
            segment_id,
            segment_type,
            name,
            encounter_id: None,
            start_time,
            end_time: None,
            duration: 0.0,
            success: None,
            characters: StreamMap::new(),
            events: Vec::new(),
            combat_periods: Vec::new(),
            mob_deaths: Vec::new(),
            mob_count: 0,
            enemy_forces_start: 0.0,
            enemy_forces_end: 0.0,
            enemy_forces_gained: 0.0,
        }
    }
}

/// A whole keystone run
#[derive(Debug, Serialize, Clone)]
pub struct MythicPlusRun {
    pub dungeon_id: u32,
    pub challenge_id: u32,
    pub dungeon_name: String,
    pub keystone_level: u32,
    pub affixes: Vec<u32>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    /// Timer reported by CHALLENGE_MODE_END
    pub official_time: Option<f64>,
    pub actual_time: f64,
    pub time_limit_seconds: Option<f64>,
    pub completed: bool,
    pub abandoned: bool,
    pub in_time: Option<bool>,
    pub deaths: u32,
    pub segments: Vec<CombatSegment>,
    pub boss_segments: Vec<usize>,
    pub trash_segments: Vec<usize>,
    pub overall_characters: StreamMap,
    pub combat_periods: Vec<CombatPeriod>,
}

impl MythicPlusRun {
    pub fn new(
        dungeon_id: u32,
        challenge_id: u32,
        dungeon_name: String,
        keystone_level: u32,
        affixes: Vec<u32>,
        start_time: NaiveDateTime,
    ) -> Self {
        MythicPlusRun {
            dungeon_id,
            challenge_id,
            dungeon_name,
            keystone_level,
            affixes,
            start_time,
            end_time: None,
            official_time: None,
            actual_time: 0.0,
            time_limit_seconds: None,
            completed: false,
            abandoned: false,
            in_time: None,
            deaths: 0,
            segments: Vec::new(),
            boss_segments: Vec::new(),
            trash_segments: Vec::new(),
            overall_characters: StreamMap::new(),
            combat_periods: Vec::new(),
        }
    }
}

/// Difficulty ID to name mapping
pub fn difficulty_name(id: u32) -> String {
    match id {
        1 => "Normal".to_string(),
        2 => "Heroic".to_string(),
        8 => "Mythic Keystone".to_string(),
        14 => "Normal (Raid)".to_string(),
        15 => "Heroic (Raid)".to_string(),
        16 => "Mythic (Raid)".to_string(),
        17 => "Looking for Raid".to_string(),
        23 => "Mythic".to_string(),
        24 => "Timewalking".to_string(),
        _ => format!("Unknown ({})", id),
    }
}

/// Map a specialization ID to its class, spec and role
pub fn spec_info(spec_id: u32) -> Option<SpecInfo> {
    use Role::*;
    let (class_name, spec_name, role) = match spec_id {
        // Warrior
        71 => ("Warrior", "Arms", Dps),
        72 => ("Warrior", "Fury", Dps),
        73 => ("Warrior", "Protection", Tank),
        // Paladin
        65 => ("Paladin", "Holy", Healer),
        66 => ("Paladin", "Protection", Tank),
        70 => ("Paladin", "Retribution", Dps),
        // Hunter
        253 => ("Hunter", "Beast Mastery", Dps),
        254 => ("Hunter", "Marksmanship", Dps),
        255 => ("Hunter", "Survival", Dps),
        // Rogue
        259 => ("Rogue", "Assassination", Dps),
        260 => ("Rogue", "Outlaw", Dps),
        261 => ("Rogue", "Subtlety", Dps),
        // Priest
        256 => ("Priest", "Discipline", Healer),
        257 => ("Priest", "Holy", Healer),
        258 => ("Priest", "Shadow", Dps),
        // Death Knight
        250 => ("Death Knight", "Blood", Tank),
        251 => ("Death Knight", "Frost", Dps),
        252 => ("Death Knight", "Unholy", Dps),
        // Shaman
        262 => ("Shaman", "Elemental", Dps),
        263 => ("Shaman", "Enhancement", Dps),
        264 => ("Shaman", "Restoration", Healer),
        // Mage
        62 => ("Mage", "Arcane", Dps),
        63 => ("Mage", "Fire", Dps),
        64 => ("Mage", "Frost", Dps),
        // Warlock
        265 => ("Warlock", "Affliction", Dps),
        266 => ("Warlock", "Demonology", Dps),
        267 => ("Warlock", "Destruction", Dps),
        // Monk
        268 => ("Monk", "Brewmaster", Tank),
        270 => ("Monk", "Mistweaver", Healer),
        269 => ("Monk", "Windwalker", Dps),
        // Druid
        102 => ("Druid", "Balance", Dps),
        103 => ("Druid", "Feral", Dps),
        104 => ("Druid", "Guardian", Tank),
        105 => ("Druid", "Restoration", Healer),
        // Demon Hunter
        577 => ("Demon Hunter", "Havoc", Dps),
        581 => ("Demon Hunter", "Vengeance", Tank),
        // Evoker
        1467 => ("Evoker", "Devastation", Dps),
        1468 => ("Evoker", "Preservation", Healer),
        1473 => ("Evoker", "Augmentation", Dps),
        _ => return None,
    };
    Some(SpecInfo {
        class_name,
        spec_name,
        role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::NaiveDate;

    use crate::events::{BaseEvent, CombatEvent, EventHeader};

    fn at(secs: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 18)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap()
            + chrono::Duration::seconds(secs as i64)
    }

    fn unit(guid: &str, name: &str, flags: u32) -> Unit {
        Unit {
            guid: guid.to_string(),
            name: name.to_string(),
            flags,
            raid_flags: 0,
        }
    }

    fn event(secs: u32, source: Unit, dest: Unit) -> EventRef {
        Arc::new(CombatEvent::Base(BaseEvent {
            header: EventHeader {
                timestamp: at(secs),
                line_number: 0,
                event_type: "SPELL_CAST_SUCCESS".to_string(),
                source,
                dest,
                raw_line: String::new(),
            },
            fields: Vec::new(),
        }))
    }

    #[test]
    fn fight_tracks_participants_and_duration() {
        let mut fight = Fight::new(1, FightType::Trash, at(0));
        fight.add_event(event(0, unit("Player-1-A", "A", 0x511), unit("Creature-0-1", "Mob", 0xa48)));
        fight.add_event(event(7, unit("Pet-0-1", "Wolf", 0x1111), Unit::default()));
        fight.add_event(event(9, unit("Player-1-A", "A", 0x511), Unit::default()));

        assert_eq!(fight.participants.len(), 3);
        let player = &fight.participants["Player-1-A"];
        assert_eq!(player.first_seen, at(0));
        assert_eq!(player.last_seen, at(9));
        assert!(player.is_player);
        assert!(fight.participants["Pet-0-1"].is_pet);
        assert_eq!(fight.player_count(), 1);

        assert!(!fight.is_complete());
        assert_eq!(fight.duration(), 9.0);
        fight.finalize(None);
        assert_eq!(fight.end_time, Some(at(9)));
        assert_eq!(fight.duration_secs, Some(9.0));
    }

    #[test]
    fn explicit_duration_is_kept() {
        let mut fight = Fight::new(1, FightType::RaidBoss, at(0));
        fight.duration_secs = Some(245.123);
        fight.finalize(Some(at(250)));
        assert_eq!(fight.duration(), 245.123);
    }

    #[test]
    fn spec_lookup() {
        let info = spec_info(105).unwrap();
        assert_eq!(info.class_name, "Druid");
        assert_eq!(info.role, Role::Healer);
        assert!(spec_info(0).is_none());
        assert_eq!(difficulty_name(16), "Mythic (Raid)");
        assert_eq!(difficulty_name(99), "Unknown (99)");
    }
}
