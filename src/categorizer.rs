use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::character::DeathRecord;
use crate::events::{AuraEvent, AuraType, CombatEvent, EventRef};
use crate::models::StreamMap;

/// Raid-wide cooldowns that are always buffs whatever the aura says.
pub const MAJOR_BUFFS: &[u32] = &[
    32182,  // Heroism
    80353,  // Time Warp
    2825,   // Bloodlust
    90355,  // Ancient Hysteria
    160452, // Netherwinds
    264667, // Primal Rage
    390386, // Fury of the Aspects
    10060,  // Power Infusion
];

/// Semantic label an event is routed to a character under.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    DamageDone,
    DamageTaken,
    HealingDone,
    HealingReceived,
    BuffGained,
    BuffLost,
    BuffRefreshed,
    DebuffGained,
    DebuffLost,
    DebuffRefreshed,
    CastStarted,
    CastSucceeded,
    CastFailed,
    InterruptDone,
    InterruptReceived,
    DispelDone,
    Death,
    Resurrected,
    ResourceChange,
    AbsorbProvided,
    AbsorbReceived,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::DamageDone => "damage_done",
            EventCategory::DamageTaken => "damage_taken",
            EventCategory::HealingDone => "healing_done",
            EventCategory::HealingReceived => "healing_received",
            EventCategory::BuffGained => "buff_gained",
            EventCategory::BuffLost => "buff_lost",
            EventCategory::BuffRefreshed => "buff_refreshed",
            EventCategory::DebuffGained => "debuff_gained",
            EventCategory::DebuffLost => "debuff_lost",
            EventCategory::DebuffRefreshed => "debuff_refreshed",
            EventCategory::CastStarted => "cast_started",
            EventCategory::CastSucceeded => "cast_succeeded",
            EventCategory::CastFailed => "cast_failed",
            EventCategory::InterruptDone => "interrupt_done",
            EventCategory::InterruptReceived => "interrupt_received",
            EventCategory::DispelDone => "dispel_done",
            EventCategory::Death => "death",
            EventCategory::Resurrected => "resurrected",
            EventCategory::ResourceChange => "resource_change",
            EventCategory::AbsorbProvided => "absorb_provided",
            EventCategory::AbsorbReceived => "absorb_received",
        }
    }

    /// Counts toward activity: damage, healing and any cast.
    pub fn is_activity(&self) -> bool {
        matches!(
            self,
            EventCategory::DamageDone
                | EventCategory::HealingDone
                | EventCategory::CastStarted
                | EventCategory::CastSucceeded
                | EventCategory::CastFailed
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CategorizeError {
    #[error("{event_type} does not carry the fields its type implies")]
    ShapeMismatch { event_type: String },

    #[error("{event_type} has no destination unit")]
    MissingDestination { event_type: String },
}

#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq)]
pub struct CategorizerStats {
    pub events_processed: u64,
    pub categorization_errors: u64,
    pub tracked_pets: usize,
}

/// Resolves pet ownership and decides which characters an event concerns.
#[derive(Debug, Default)]
pub struct EventCategorizer {
    pet_owners: HashMap<String, String>,
    processed_count: u64,
    error_count: u64,
}

impl EventCategorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pet(&mut self, pet_guid: &str, owner_guid: &str) {
        if pet_guid.is_empty() || owner_guid.is_empty() || pet_guid == owner_guid {
            return;
        }
        self.pet_owners
            .insert(pet_guid.to_string(), owner_guid.to_string());
    }

    pub fn owner_of(&self, pet_guid: &str) -> Option<&str> {
        self.pet_owners.get(pet_guid).map(String::as_str)
    }

    /// The player a GUID acts for: the owner of a known pet, the player
    /// itself, or nothing.
    pub fn resolve(&self, guid: &str) -> Option<String> {
        if guid.is_empty() {
            return None;
        }
        if let Some(owner) = self.pet_owners.get(guid) {
            return Some(owner.clone());
        }
        guid.starts_with("Player-").then(|| guid.to_string())
    }

    /// Learn pet ownership from summons and from the owner field of the
    /// advanced unit state.
    pub fn observe(&mut self, event: &CombatEvent) {
        let source = event.source();
        if event.event_type() == "SPELL_SUMMON" && source.is_player() && !event.dest().is_empty() {
            debug!("tracked pet {} -> owner {}", event.dest().name, source.name);
            self.register_pet(&event.dest().guid, &source.guid);
            return;
        }

        if let Some(state) = event.unit_state() {
            if !source.is_player()
                && state.info_guid == source.guid
                && state.owner_guid.starts_with("Player-")
                && !self.pet_owners.contains_key(&source.guid)
            {
                debug!("tracked pet {} -> owner {} from unit state", source.name, state.owner_guid);
                self.register_pet(&source.guid, &state.owner_guid);
            }
        }
    }

    /// Characters in `streams` this event concerns, with their category.
    /// Errors are counted and yield no routes.
    pub fn categorize(&mut self, event: &CombatEvent, streams: &StreamMap) -> Vec<(String, EventCategory)> {
        self.observe(event);
        match self.categorize_inner(event, streams) {
            Ok(routes) => {
                self.processed_count += 1;
                routes
            }
            Err(err) => {
                debug!("error categorizing event at line {}: {}", event.header().line_number, err);
                self.error_count += 1;
                Vec::new()
            }
        }
    }

    fn categorize_inner(
        &self,
        event: &CombatEvent,
        streams: &StreamMap,
    ) -> Result<Vec<(String, EventCategory)>, CategorizeError> {
        let mut routes = Vec::new();
        let mut route = |guid: Option<String>, category: EventCategory| {
            if let Some(guid) = guid.filter(|g| streams.contains_key(g)) {
                routes.push((guid, category));
            }
        };
        let source = || self.resolve(&event.source().guid);
        let dest = || self.resolve(&event.dest().guid);
        let event_type = event.event_type();

        match event {
            CombatEvent::Damage(_) => {
                route(source(), EventCategory::DamageDone);
                route(dest(), EventCategory::DamageTaken);
            }
            CombatEvent::Heal(_) => {
                route(source(), EventCategory::HealingDone);
                route(dest(), EventCategory::HealingReceived);
            }
            CombatEvent::Absorb(absorb) => {
                route(self.resolve(&absorb.absorber.guid), EventCategory::AbsorbProvided);
                route(dest(), EventCategory::AbsorbReceived);
            }
            CombatEvent::Aura(aura) => {
                let buff = self.is_buff(aura);
                let category = match event_type {
                    "SPELL_AURA_APPLIED" | "SPELL_AURA_APPLIED_DOSE" if buff => Some(EventCategory::BuffGained),
                    "SPELL_AURA_APPLIED" | "SPELL_AURA_APPLIED_DOSE" => Some(EventCategory::DebuffGained),
                    "SPELL_AURA_REFRESH" if buff => Some(EventCategory::BuffRefreshed),
                    "SPELL_AURA_REFRESH" => Some(EventCategory::DebuffRefreshed),
                    "SPELL_AURA_REMOVED" | "SPELL_AURA_REMOVED_DOSE" if buff => Some(EventCategory::BuffLost),
                    "SPELL_AURA_REMOVED" | "SPELL_AURA_REMOVED_DOSE" => Some(EventCategory::DebuffLost),
                    _ => None,
                };
                if let Some(category) = category {
                    route(dest(), category);
                }
            }
            CombatEvent::Encounter(_) | CombatEvent::ChallengeMode(_) | CombatEvent::CombatantInfo(_) => {}
            CombatEvent::Base(_) | CombatEvent::Spell(_) => {
                if has_missing_shape(event) {
                    return Err(CategorizeError::ShapeMismatch {
                        event_type: event_type.to_string(),
                    });
                }
                match event_type {
                    "SPELL_CAST_START" => route(source(), EventCategory::CastStarted),
                    "SPELL_CAST_SUCCESS" => route(source(), EventCategory::CastSucceeded),
                    "SPELL_CAST_FAILED" => route(source(), EventCategory::CastFailed),
                    "SPELL_INTERRUPT" => {
                        route(source(), EventCategory::InterruptDone);
                        route(dest(), EventCategory::InterruptReceived);
                    }
                    "SPELL_DISPEL" | "SPELL_STOLEN" => route(source(), EventCategory::DispelDone),
                    "SPELL_ENERGIZE" | "SPELL_PERIODIC_ENERGIZE" => {
                        route(dest(), EventCategory::ResourceChange)
                    }
                    // A dead pet is not its owner's death.
                    "UNIT_DIED" | "SPELL_RESURRECT" => {
                        let dest = event.dest();
                        if dest.is_empty() {
                            return Err(CategorizeError::MissingDestination {
                                event_type: event_type.to_string(),
                            });
                        }
                        let category = if event_type == "UNIT_DIED" {
                            EventCategory::Death
                        } else {
                            EventCategory::Resurrected
                        };
                        if dest.is_player() {
                            route(Some(dest.guid.clone()), category);
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(routes)
    }

    /// Explicit polarity wins, then the major-buff list, then the
    /// player-to-player rule. Anything else is a debuff.
    ///
    /// Known limitation: a utility debuff one player puts on another is
    /// reported as a buff when the line carries no polarity.
    pub fn is_buff(&self, aura: &AuraEvent) -> bool {
        if let Some(aura_type) = aura.aura_type {
            return aura_type == AuraType::Buff;
        }
        if MAJOR_BUFFS.contains(&aura.spell.id) {
            return true;
        }
        let source = self.resolve(&aura.header.source.guid);
        let dest = self.resolve(&aura.header.dest.guid);
        source.is_some() && dest.is_some()
    }

    /// Categorize `event` and apply it to the streams it concerns,
    /// including death bookkeeping and combatant enrichment.
    pub fn route_event(&mut self, event: &EventRef, streams: &mut StreamMap) {
        let routes = self.categorize(event, streams);
        let timestamp = event.timestamp();

        for (guid, category) in routes {
            let Some(stream) = streams.get_mut(&guid) else {
                continue;
            };
            match category {
                EventCategory::Death => {
                    let killing_blow = stream.last_damage_taken();
                    stream.add_death(DeathRecord::new(timestamp, killing_blow));
                }
                EventCategory::Resurrected => {
                    stream.record_resurrect(timestamp);
                }
                _ => {}
            }
            stream.add_event(event.clone(), category);
        }

        if let CombatEvent::CombatantInfo(info) = event.as_ref() {
            if let Some(stream) = streams.get_mut(&info.player_guid) {
                stream.set_spec(info.spec_id);
                if let Some(item_level) = info.average_item_level() {
                    stream.item_level = Some(item_level);
                }
            }
        }
    }

    pub fn stats(&self) -> CategorizerStats {
        CategorizerStats {
            events_processed: self.processed_count,
            categorization_errors: self.error_count,
            tracked_pets: self.pet_owners.len(),
        }
    }
}

/// Heal, aura and spell-damage types that did not get their typed variant
/// because the line was cut short.
fn has_missing_shape(event: &CombatEvent) -> bool {
    let event_type = event.event_type();
    event_type.ends_with("_HEAL")
        || event_type.contains("_AURA_")
        || (event_type.ends_with("_DAMAGE") && !event_type.starts_with("SWING_"))
}
