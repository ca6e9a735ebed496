use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, warn};

use crate::categorizer::EventCategory;
use crate::combat_periods::CombatPeriod;
use crate::config::BASELINE_GCD_SECS;
use crate::events::{CombatEvent, EventRef};
use crate::models::{seconds_between, spec_info, Role};
use crate::tokenizer::{u32_at, u64_at};

/// An event as seen by one character, with the label it was routed under.
#[derive(Debug, Serialize, Clone)]
pub struct TimestampedEvent {
    pub timestamp: NaiveDateTime,
    pub category: EventCategory,
    pub event: EventRef,
}

#[derive(Debug, Serialize, Clone)]
pub struct DeathRecord {
    pub timestamp: NaiveDateTime,
    /// Last damage taken before the death, if any was routed.
    pub killing_blow: Option<EventRef>,
    pub overkill: u64,
    pub resurrect_time: Option<NaiveDateTime>,
}

impl DeathRecord {
    pub fn new(timestamp: NaiveDateTime, killing_blow: Option<EventRef>) -> Self {
        let overkill = match killing_blow.as_deref() {
            Some(CombatEvent::Damage(d)) => d.overkill,
            _ => 0,
        };
        DeathRecord {
            timestamp,
            killing_blow,
            overkill,
            resurrect_time: None,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ResourceChange {
    pub timestamp: NaiveDateTime,
    pub spell_id: u32,
    pub power_type: u32,
    pub amount: u64,
    pub over_energize: u64,
    pub max_power: u64,
}

impl ResourceChange {
    /// Energize payloads are `amount, overEnergize, powerType, maxPower` on
    /// current clients and `amount, powerType` on old ones.
    fn from_event(event: &CombatEvent) -> Option<Self> {
        let CombatEvent::Spell(spell) = event else {
            return None;
        };
        let extra = &spell.extra;
        let (over_energize, power_type, max_power) = if extra.len() >= 4 {
            (u64_at(extra, 1), u32_at(extra, 2), u64_at(extra, 3))
        } else {
            (0, u32_at(extra, 1), 0)
        };
        Some(ResourceChange {
            timestamp: spell.header.timestamp,
            spell_id: spell.spell.id,
            power_type,
            amount: u64_at(extra, 0),
            over_energize,
            max_power,
        })
    }
}

/// Everything one character did or suffered within a scope.
#[derive(Debug, Serialize, Clone, Default)]
pub struct CharacterEventStream {
    pub character_guid: String,
    pub character_name: String,
    pub server: Option<String>,
    pub region: Option<String>,
    pub class_name: Option<String>,
    pub spec_name: Option<String>,
    pub spec_id: Option<u32>,
    pub role: Option<Role>,
    pub item_level: Option<f64>,

    pub all_events: Vec<TimestampedEvent>,

    pub damage_done: Vec<EventRef>,
    pub damage_taken: Vec<EventRef>,
    pub healing_done: Vec<EventRef>,
    pub healing_received: Vec<EventRef>,
    pub buffs_gained: Vec<EventRef>,
    pub buffs_lost: Vec<EventRef>,
    pub buffs_refreshed: Vec<EventRef>,
    pub debuffs_gained: Vec<EventRef>,
    pub debuffs_lost: Vec<EventRef>,
    pub debuffs_refreshed: Vec<EventRef>,
    pub casts_started: Vec<EventRef>,
    pub casts_succeeded: Vec<EventRef>,
    pub casts_failed: Vec<EventRef>,
    pub interrupts_done: Vec<EventRef>,
    pub interrupts_received: Vec<EventRef>,
    pub dispels_done: Vec<EventRef>,
    pub deaths: Vec<DeathRecord>,
    pub resource_changes: Vec<ResourceChange>,
    pub absorption_provided: Vec<EventRef>,
    pub absorption_received: Vec<EventRef>,

    pub total_damage_done: u64,
    pub total_healing_done: u64,
    pub total_damage_taken: u64,
    pub total_healing_received: u64,
    pub total_overhealing: u64,
    pub total_overkill_done: u64,
    pub total_overkill_taken: u64,
    pub total_damage_absorbed_by_shields: u64,
    pub total_damage_absorbed_for_me: u64,
    pub death_count: u32,

    /// spell id -> application
    pub active_buffs: HashMap<u32, EventRef>,
    pub active_debuffs: HashMap<u32, EventRef>,

    pub activity_percentage: f64,
    pub time_alive: f64,
    pub combat_time: f64,
}

impl CharacterEventStream {
    pub fn new(guid: &str, name: &str) -> Self {
        let mut stream = CharacterEventStream {
            character_guid: guid.to_string(),
            ..Default::default()
        };
        stream.set_name(name);
        stream
    }

    pub fn set_name(&mut self, name: &str) {
        let (server, region) = split_realm(name);
        self.character_name = name.to_string();
        self.server = server;
        self.region = region;
    }

    /// Fill class, spec and role from a specialization id.
    pub fn set_spec(&mut self, spec_id: u32) {
        if spec_id == 0 {
            return;
        }
        self.spec_id = Some(spec_id);
        if let Some(info) = spec_info(spec_id) {
            self.class_name = Some(info.class_name.to_string());
            self.spec_name = Some(info.spec_name.to_string());
            self.role = Some(info.role);
        }
    }

    pub fn add_event(&mut self, event: EventRef, category: EventCategory) {
        self.all_events.push(TimestampedEvent {
            timestamp: event.timestamp(),
            category,
            event: event.clone(),
        });
        self.route(&event, category);
    }

    fn route(&mut self, event: &EventRef, category: EventCategory) {
        use EventCategory as C;

        match (category, event.as_ref()) {
            (C::DamageDone, CombatEvent::Damage(d)) => {
                self.total_damage_done += d.amount;
                self.total_overkill_done += d.overkill;
                self.damage_done.push(event.clone());
            }
            (C::DamageTaken, CombatEvent::Damage(d)) => {
                self.total_damage_taken += d.amount;
                self.total_overkill_taken += d.overkill;
                self.damage_taken.push(event.clone());
            }
            (C::HealingDone, CombatEvent::Heal(h)) => {
                self.total_healing_done += h.effective_healing();
                self.total_overhealing += h.overhealing;
                self.healing_done.push(event.clone());
            }
            (C::HealingReceived, CombatEvent::Heal(h)) => {
                self.total_healing_received += h.effective_healing();
                self.healing_received.push(event.clone());
            }
            (C::DamageDone | C::DamageTaken | C::HealingDone | C::HealingReceived, _) => {
                warn!(
                    "{} routed as {} without amount data, character {}",
                    event.event_type(),
                    category.as_str(),
                    self.character_name
                );
            }
            (C::BuffGained | C::BuffRefreshed, CombatEvent::Aura(a)) => {
                self.active_buffs.insert(a.spell.id, event.clone());
                if category == C::BuffGained {
                    self.buffs_gained.push(event.clone());
                } else {
                    self.buffs_refreshed.push(event.clone());
                }
            }
            (C::BuffLost, CombatEvent::Aura(a)) => {
                self.active_buffs.remove(&a.spell.id);
                self.buffs_lost.push(event.clone());
            }
            (C::DebuffGained | C::DebuffRefreshed, CombatEvent::Aura(a)) => {
                self.active_debuffs.insert(a.spell.id, event.clone());
                if category == C::DebuffGained {
                    self.debuffs_gained.push(event.clone());
                } else {
                    self.debuffs_refreshed.push(event.clone());
                }
            }
            (C::DebuffLost, CombatEvent::Aura(a)) => {
                self.active_debuffs.remove(&a.spell.id);
                self.debuffs_lost.push(event.clone());
            }
            (C::CastStarted, _) => self.casts_started.push(event.clone()),
            (C::CastSucceeded, _) => self.casts_succeeded.push(event.clone()),
            (C::CastFailed, _) => self.casts_failed.push(event.clone()),
            (C::InterruptDone, _) => self.interrupts_done.push(event.clone()),
            (C::InterruptReceived, _) => self.interrupts_received.push(event.clone()),
            (C::DispelDone, _) => self.dispels_done.push(event.clone()),
            (C::ResourceChange, _) => match ResourceChange::from_event(event) {
                Some(change) => self.resource_changes.push(change),
                None => debug!("resource change without energize payload: {}", event.event_type()),
            },
            (C::AbsorbProvided, CombatEvent::Absorb(a)) => {
                self.total_damage_absorbed_by_shields += a.amount;
                self.absorption_provided.push(event.clone());
            }
            (C::AbsorbReceived, CombatEvent::Absorb(a)) => {
                self.total_damage_absorbed_for_me += a.amount;
                self.absorption_received.push(event.clone());
            }
            // The death record itself is added through add_death.
            (C::Death | C::Resurrected, _) => {}
            _ => debug!(
                "event not routed: category={}, event_type={}",
                category.as_str(),
                event.event_type()
            ),
        }
    }

    pub fn add_death(&mut self, death: DeathRecord) {
        self.deaths.push(death);
        self.death_count += 1;
    }

    /// Mark the most recent death as resurrected at `timestamp`.
    pub fn record_resurrect(&mut self, timestamp: NaiveDateTime) -> bool {
        match self.deaths.last_mut() {
            Some(death) if death.resurrect_time.is_none() => {
                death.resurrect_time = Some(timestamp);
                true
            }
            _ => false,
        }
    }

    pub fn last_damage_taken(&self) -> Option<EventRef> {
        self.damage_taken.last().cloned()
    }

    /// Events whose timestamps fall within `[start, end]`.
    pub fn events_in_range(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<&TimestampedEvent> {
        self.all_events
            .iter()
            .filter(|e| start <= e.timestamp && e.timestamp <= end)
            .collect()
    }

    pub fn get_dps(&self, duration: f64) -> f64 {
        per_second(self.total_damage_done, duration)
    }

    pub fn get_hps(&self, duration: f64) -> f64 {
        per_second(self.total_healing_done, duration)
    }

    pub fn get_dtps(&self, duration: f64) -> f64 {
        per_second(self.total_damage_taken, duration)
    }

    pub fn get_combat_dps(&self) -> f64 {
        per_second(self.total_damage_done, self.combat_time)
    }

    pub fn get_combat_hps(&self) -> f64 {
        per_second(self.total_healing_done, self.combat_time)
    }

    pub fn get_combat_dtps(&self) -> f64 {
        per_second(self.total_damage_taken, self.combat_time)
    }

    /// Compute time alive, combat time and activity for this scope.
    pub fn calculate_combat_metrics(&mut self, periods: &[CombatPeriod], encounter_duration: f64) {
        if self.all_events.is_empty() {
            self.activity_percentage = 0.0;
            self.time_alive = 0.0;
            self.combat_time = 0.0;
            return;
        }

        // A death without a resurrect lasts until the scope ends.
        let last_event = self.all_events.iter().map(|e| e.timestamp).max();
        let last_period = periods.iter().map(|p| p.end_time).max();
        let scope_end = last_event.max(last_period);

        let dead_intervals: Vec<(NaiveDateTime, NaiveDateTime)> = self
            .deaths
            .iter()
            .map(|death| {
                let end = death
                    .resurrect_time
                    .or(scope_end)
                    .unwrap_or(death.timestamp)
                    .max(death.timestamp);
                (death.timestamp, end)
            })
            .collect();

        let time_dead: f64 = dead_intervals
            .iter()
            .map(|&(start, end)| seconds_between(start, end))
            .sum();
        self.time_alive = (encounter_duration - time_dead).max(0.0);

        let period_time: f64 = periods.iter().map(CombatPeriod::duration).sum();
        let dead_in_combat: f64 = dead_intervals
            .iter()
            .flat_map(|&(dead_from, dead_to)| {
                periods.iter().map(move |p| {
                    let overlap_start = dead_from.max(p.start_time);
                    let overlap_end = dead_to.min(p.end_time);
                    if overlap_start < overlap_end {
                        seconds_between(overlap_start, overlap_end)
                    } else {
                        0.0
                    }
                })
            })
            .sum();
        self.combat_time = (period_time - dead_in_combat).max(0.0);

        let combat_events = self
            .all_events
            .iter()
            .filter(|e| e.category.is_activity())
            .filter(|e| periods.iter().any(|p| p.contains(e.timestamp)))
            .count();

        let possible_gcds = self.combat_time / BASELINE_GCD_SECS;
        self.activity_percentage = if possible_gcds > 0.0 {
            (combat_events as f64 / possible_gcds * 100.0).min(100.0)
        } else {
            0.0
        };
    }

    pub fn summary(&self, duration: f64) -> CharacterSummary {
        CharacterSummary {
            guid: self.character_guid.clone(),
            name: self.character_name.clone(),
            class_name: self.class_name.clone().unwrap_or_default(),
            spec_name: self.spec_name.clone().unwrap_or_default(),
            damage_done: self.total_damage_done,
            healing_done: self.total_healing_done,
            damage_taken: self.total_damage_taken,
            overhealing: self.total_overhealing,
            deaths: self.death_count,
            dps: self.get_dps(duration),
            hps: self.get_hps(duration),
            combat_dps: self.get_combat_dps(),
            activity_percentage: self.activity_percentage,
            time_alive: self.time_alive,
            combat_time: self.combat_time,
            abilities: ability_breakdown(&self.damage_done),
            heal_abilities: ability_breakdown(&self.healing_done),
        }
    }
}

/// Compact per-player numbers for a scope.
#[derive(Debug, Serialize, Clone)]
pub struct CharacterSummary {
    pub guid: String,
    pub name: String,
    pub class_name: String,
    pub spec_name: String,
    pub damage_done: u64,
    pub healing_done: u64,
    pub damage_taken: u64,
    pub overhealing: u64,
    pub deaths: u32,
    pub dps: f64,
    pub hps: f64,
    pub combat_dps: f64,
    pub activity_percentage: f64,
    pub time_alive: f64,
    pub combat_time: f64,
    pub abilities: Vec<AbilityBreakdown>,
    pub heal_abilities: Vec<AbilityBreakdown>,
}

/// Damage/healing breakdown per ability
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AbilityBreakdown {
    pub spell_id: u32,
    pub spell_name: String,
    pub spell_school: u32,
    pub total_amount: u64,
    pub hit_count: u32,
}

/// Totals per spell, largest first. Heals count effective healing.
fn ability_breakdown(events: &[EventRef]) -> Vec<AbilityBreakdown> {
    let mut by_spell: HashMap<(u32, String), AbilityBreakdown> = HashMap::new();
    for event in events {
        let (spell, amount) = match event.as_ref() {
            CombatEvent::Damage(d) => (&d.spell, d.amount),
            CombatEvent::Heal(h) => (&h.spell, h.effective_healing()),
            _ => continue,
        };
        let entry = by_spell
            .entry((spell.id, spell.name.clone()))
            .or_insert_with(|| AbilityBreakdown {
                spell_id: spell.id,
                spell_name: spell.name.clone(),
                spell_school: spell.school,
                total_amount: 0,
                hit_count: 0,
            });
        entry.total_amount += amount;
        entry.hit_count += 1;
    }

    let mut abilities: Vec<AbilityBreakdown> = by_spell.into_values().collect();
    abilities.sort_by(|a, b| {
        b.total_amount
            .cmp(&a.total_amount)
            .then_with(|| a.spell_id.cmp(&b.spell_id))
    });
    abilities
}

fn per_second(total: u64, duration: f64) -> f64 {
    if duration <= 0.0 {
        return 0.0;
    }
    total as f64 / duration
}

/// "Name-Realm-REGION" -> (realm, region). Realms may contain dashes only
/// when a region suffix is present.
fn split_realm(name: &str) -> (Option<String>, Option<String>) {
    let mut parts = name.splitn(2, '-');
    let _character = parts.next();
    let Some(rest) = parts.next().filter(|r| !r.is_empty()) else {
        return (None, None);
    };
    match rest.rsplit_once('-') {
        Some((realm, region))
            if !realm.is_empty() && region.len() == 2 && region.chars().all(|c| c.is_ascii_uppercase()) =>
        {
            (Some(realm.to_string()), Some(region.to_string()))
        }
        _ => (Some(rest.to_string()), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate};

    use crate::combat_periods::CombatPeriodDetector;
    use crate::events::{AuraEvent, AuraType, DamageEvent, EventHeader, HealEvent, SpellEvent, SpellInfo, Unit};
    use crate::tokenizer::Token;

    const PLAYER: &str = "Player-1111-00000001";

    fn at(secs: f64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 18)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap()
            + Duration::milliseconds((secs * 1000.0) as i64)
    }

    fn header(event_type: &str, secs: f64) -> EventHeader {
        EventHeader {
            timestamp: at(secs),
            line_number: 0,
            event_type: event_type.to_string(),
            source: Unit {
                guid: PLAYER.to_string(),
                name: "Arakara-Illidan-US".to_string(),
                ..Unit::default()
            },
            dest: Unit::default(),
            raw_line: String::new(),
        }
    }

    fn spell(id: u32) -> SpellInfo {
        SpellInfo {
            id,
            name: format!("Spell {id}"),
            school: 4,
        }
    }

    fn damage(secs: f64, amount: u64, overkill: u64) -> EventRef {
        Arc::new(CombatEvent::Damage(DamageEvent {
            header: header("SPELL_DAMAGE", secs),
            spell: spell(133),
            amount,
            base_amount: amount,
            overkill,
            school: 4,
            resisted: 0,
            blocked: 0,
            absorbed: 0,
            critical: false,
            glancing: false,
            crushing: false,
            is_offhand: false,
            unit_state: None,
        }))
    }

    fn heal(secs: f64, amount: u64, overhealing: u64) -> EventRef {
        Arc::new(CombatEvent::Heal(HealEvent {
            header: header("SPELL_HEAL", secs),
            spell: spell(2061),
            amount,
            base_amount: amount,
            overhealing,
            absorbed: 0,
            critical: false,
            unit_state: None,
        }))
    }

    fn aura(event_type: &str, secs: f64, id: u32) -> EventRef {
        Arc::new(CombatEvent::Aura(AuraEvent {
            header: header(event_type, secs),
            spell: spell(id),
            aura_type: Some(AuraType::Buff),
            stacks: 1,
        }))
    }

    fn cast(secs: f64) -> EventRef {
        Arc::new(CombatEvent::Spell(SpellEvent {
            header: header("SPELL_CAST_SUCCESS", secs),
            spell: spell(133),
            extra: Vec::new(),
            unit_state: None,
        }))
    }

    fn stream() -> CharacterEventStream {
        CharacterEventStream::new(PLAYER, "Arakara-Illidan-US")
    }

    #[test]
    fn damage_total_matches_routed_amounts() {
        let mut s = stream();
        s.add_event(damage(0.0, 12500, 0), EventCategory::DamageDone);
        s.add_event(damage(1.0, 300, 120), EventCategory::DamageDone);
        assert_eq!(s.total_damage_done, 12800);
        assert_eq!(s.total_overkill_done, 120);
        let sum: u64 = s
            .damage_done
            .iter()
            .map(|e| match e.as_ref() {
                CombatEvent::Damage(d) => d.amount,
                _ => 0,
            })
            .sum();
        assert_eq!(sum, s.total_damage_done);
        assert_eq!(s.all_events.len(), 2);
    }

    #[test]
    fn healing_uses_effective_amount() {
        let mut s = stream();
        s.add_event(heal(0.0, 8500, 1500), EventCategory::HealingDone);
        s.add_event(heal(1.0, 500, 900), EventCategory::HealingDone);
        s.add_event(heal(2.0, 8500, 1500), EventCategory::HealingReceived);
        assert_eq!(s.total_healing_done, 7000);
        assert_eq!(s.total_overhealing, 2400);
        assert_eq!(s.total_healing_received, 7000);
    }

    #[test]
    fn wrong_shape_is_not_counted() {
        let mut s = stream();
        s.add_event(cast(0.0), EventCategory::DamageDone);
        assert_eq!(s.total_damage_done, 0);
        assert!(s.damage_done.is_empty());
        assert_eq!(s.all_events.len(), 1);
    }

    #[test]
    fn dps_arithmetic() {
        let mut s = stream();
        s.add_event(damage(0.0, 12500, 0), EventCategory::DamageDone);
        assert_eq!(s.get_dps(10.0), 1250.0);
        assert_eq!(s.get_dps(0.0), 0.0);
        assert_eq!(s.get_dps(-1.0), 0.0);
        assert_eq!(s.get_hps(10.0), 0.0);
        assert_eq!(s.get_combat_dps(), 0.0);
    }

    #[test]
    fn active_auras_follow_apply_and_remove() {
        let mut s = stream();
        s.add_event(aura("SPELL_AURA_APPLIED", 0.0, 1459), EventCategory::BuffGained);
        s.add_event(aura("SPELL_AURA_APPLIED", 0.0, 21562), EventCategory::BuffGained);
        s.add_event(aura("SPELL_AURA_REMOVED", 3.0, 1459), EventCategory::BuffLost);
        assert_eq!(s.buffs_gained.len(), 2);
        assert_eq!(s.buffs_lost.len(), 1);
        assert!(s.active_buffs.contains_key(&21562));
        assert!(!s.active_buffs.contains_key(&1459));
    }

    #[test]
    fn energize_becomes_resource_change() {
        let mut s = stream();
        let energize = Arc::new(CombatEvent::Spell(SpellEvent {
            header: header("SPELL_ENERGIZE", 0.0),
            spell: spell(5),
            extra: vec![Token::Int(20), Token::Int(0), Token::Int(3), Token::Int(100)],
            unit_state: None,
        }));
        s.add_event(energize, EventCategory::ResourceChange);
        assert_eq!(s.resource_changes.len(), 1);
        assert_eq!(s.resource_changes[0].power_type, 3);
        assert_eq!(s.resource_changes[0].amount, 20);
        assert_eq!(s.resource_changes[0].max_power, 100);
    }

    #[test]
    fn deaths_and_resurrects() {
        let mut s = stream();
        s.add_event(damage(0.0, 100, 0), EventCategory::DamageTaken);
        let killing = s.last_damage_taken();
        s.add_death(DeathRecord::new(at(1.0), killing));
        assert_eq!(s.death_count, 1);
        assert!(s.record_resurrect(at(4.0)));
        assert!(!s.record_resurrect(at(5.0)));
        assert_eq!(s.deaths[0].resurrect_time, Some(at(4.0)));
        assert!(s.deaths[0].killing_blow.is_some());
    }

    #[test]
    fn combat_metrics_account_for_death() {
        let mut s = stream();
        for i in 0..6 {
            s.add_event(cast(i as f64), EventCategory::CastSucceeded);
        }
        s.add_event(damage(10.0, 500, 0), EventCategory::DamageDone);
        s.add_event(damage(3.0, 100, 0), EventCategory::DamageTaken);
        s.add_death(DeathRecord::new(at(6.0), None));
        s.record_resurrect(at(8.0));

        let periods = CombatPeriodDetector::with_gap(5.0).detect_times((0..=10).map(|i| at(i as f64)).collect());
        assert_eq!(periods.len(), 1);

        s.calculate_combat_metrics(&periods, 20.0);
        assert_eq!(s.time_alive, 18.0);
        assert_eq!(s.combat_time, 8.0);
        // 7 active events in 8s of live combat: 7 / (8 / 1.5) -> 131%, capped
        assert_eq!(s.activity_percentage, 100.0);
        assert_eq!(s.get_combat_dps(), 500.0 / 8.0);
    }

    #[test]
    fn unresurrected_death_runs_to_scope_end() {
        let mut s = stream();
        s.add_event(cast(0.0), EventCategory::CastSucceeded);
        s.add_death(DeathRecord::new(at(2.0), None));
        let periods = CombatPeriodDetector::with_gap(5.0).detect_times(vec![at(0.0), at(4.0), at(9.0)]);
        s.calculate_combat_metrics(&periods, 9.0);
        // dead from 2s to the last period end at 9s
        assert_eq!(s.time_alive, 2.0);
        assert_eq!(s.combat_time, 2.0);
        assert!((s.activity_percentage - 75.0).abs() < 1e-9);
    }

    #[test]
    fn empty_stream_has_zero_metrics() {
        let mut s = stream();
        s.calculate_combat_metrics(&[], 30.0);
        assert_eq!(s.time_alive, 0.0);
        assert_eq!(s.activity_percentage, 0.0);
    }

    #[test]
    fn realm_and_region_from_name() {
        assert_eq!(
            split_realm("Arakara-Illidan-US"),
            (Some("Illidan".to_string()), Some("US".to_string()))
        );
        assert_eq!(
            split_realm("Bob-Area-52-US"),
            (Some("Area-52".to_string()), Some("US".to_string()))
        );
        assert_eq!(split_realm("Bob-Illidan"), (Some("Illidan".to_string()), None));
        assert_eq!(split_realm("Bob"), (None, None));
        let s = stream();
        assert_eq!(s.server.as_deref(), Some("Illidan"));
    }

    #[test]
    fn summary_breaks_down_abilities() {
        let mut s = stream();
        s.set_spec(63);
        s.add_event(damage(0.0, 100, 0), EventCategory::DamageDone);
        s.add_event(damage(1.0, 200, 0), EventCategory::DamageDone);
        let summary = s.summary(10.0);
        assert_eq!(summary.class_name, "Mage");
        assert_eq!(summary.spec_name, "Fire");
        assert_eq!(summary.dps, 30.0);
        assert_eq!(summary.abilities.len(), 1);
        assert_eq!(summary.abilities[0].total_amount, 300);
        assert_eq!(summary.abilities[0].hit_count, 2);
    }
}
