use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::{FactoryConfig, SwingRepresentation};
use crate::tokenizer::{f64_at, flag_at, int_at, text_at, u32_at, u64_at, ParsedLine, Token};

/// Placeholder GUID the client writes for "no unit".
pub const NULL_GUID: &str = "0000000000000000";

/// Events are shared between the fight, segment and character views.
pub type EventRef = Arc<CombatEvent>;

/// GUID text of a token. Nil and the null GUID map to an empty string.
pub(crate) fn guid_of(token: Option<&Token>) -> String {
    match token {
        Some(Token::Str(s)) if s != NULL_GUID => s.clone(),
        Some(Token::Int(v)) if *v != 0 => v.to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Unit {
    pub guid: String,
    pub name: String,
    pub flags: u32,
    pub raid_flags: u32,
}

impl Unit {
    /// Read a GUID/name/flags/raid-flags quadruple starting at `offset`.
    pub fn from_tokens(tokens: &[Token], offset: usize) -> Self {
        Unit {
            guid: guid_of(tokens.get(offset)),
            name: text_at(tokens, offset + 1),
            flags: u32_at(tokens, offset + 2),
            raid_flags: u32_at(tokens, offset + 3),
        }
    }

    pub fn is_player(&self) -> bool {
        self.guid.starts_with("Player-")
    }

    pub fn is_pet(&self) -> bool {
        self.guid.starts_with("Pet-")
    }

    pub fn is_empty(&self) -> bool {
        self.guid.is_empty()
    }
}

/// Fields every event carries.
#[derive(Debug, Clone, Serialize)]
pub struct EventHeader {
    pub timestamp: NaiveDateTime,
    pub line_number: u64,
    pub event_type: String,
    pub source: Unit,
    pub dest: Unit,
    #[serde(skip)]
    pub raw_line: String,
}

impl EventHeader {
    fn from_line(line: &ParsedLine) -> Self {
        EventHeader {
            timestamp: line.timestamp,
            line_number: line.line_number,
            event_type: line.event_type.clone(),
            source: Unit::from_tokens(&line.base, 0),
            dest: Unit::from_tokens(&line.base, 4),
            raw_line: line.raw_line.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpellInfo {
    pub id: u32,
    pub name: String,
    pub school: u32,
}

impl SpellInfo {
    pub fn from_tokens(tokens: &[Token]) -> Self {
        SpellInfo {
            id: u32_at(tokens, 0),
            name: text_at(tokens, 1),
            school: u32_at(tokens, 2),
        }
    }

    /// Auto-attacks carry no spell prefix.
    pub fn melee() -> Self {
        SpellInfo {
            id: 0,
            name: "Melee".to_string(),
            school: 1,
        }
    }
}

/// The advanced per-unit snapshot inserted before the payload when
/// advanced logging is enabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnitState {
    pub info_guid: String,
    pub owner_guid: String,
    pub current_hp: u64,
    pub max_hp: u64,
    pub attack_power: u64,
    pub spell_power: u64,
    pub armor: u64,
    pub absorb: u64,
    pub power_type: u32,
    pub current_power: u64,
    pub max_power: u64,
    pub power_cost: u64,
    pub position_x: f64,
    pub position_y: f64,
    pub ui_map_id: u32,
    pub facing: f64,
    pub level: u32,
    pub extra: Vec<Token>,
}

impl UnitState {
    pub fn from_tokens(tokens: &[Token]) -> Self {
        UnitState {
            info_guid: guid_of(tokens.first()),
            owner_guid: guid_of(tokens.get(1)),
            current_hp: u64_at(tokens, 2),
            max_hp: u64_at(tokens, 3),
            attack_power: u64_at(tokens, 4),
            spell_power: u64_at(tokens, 5),
            armor: u64_at(tokens, 6),
            absorb: u64_at(tokens, 7),
            power_type: u32_at(tokens, 8),
            current_power: u64_at(tokens, 9),
            max_power: u64_at(tokens, 10),
            power_cost: u64_at(tokens, 11),
            position_x: f64_at(tokens, 12),
            position_y: f64_at(tokens, 13),
            ui_map_id: u32_at(tokens, 14),
            facing: f64_at(tokens, 15),
            level: u32_at(tokens, 16),
            extra: tokens.get(17..).map(<[Token]>::to_vec).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BaseEvent {
    pub header: EventHeader,
    /// Prefix and suffix tokens, kept for event types without a dedicated layout.
    pub fields: Vec<Token>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpellEvent {
    pub header: EventHeader,
    pub spell: SpellInfo,
    pub extra: Vec<Token>,
    pub unit_state: Option<UnitState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DamageEvent {
    pub header: EventHeader,
    pub spell: SpellInfo,
    pub amount: u64,
    pub base_amount: u64,
    pub overkill: u64,
    pub school: u32,
    pub resisted: u64,
    pub blocked: u64,
    pub absorbed: u64,
    pub critical: bool,
    pub glancing: bool,
    pub crushing: bool,
    pub is_offhand: bool,
    pub unit_state: Option<UnitState>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealEvent {
    pub header: EventHeader,
    pub spell: SpellInfo,
    pub amount: u64,
    pub base_amount: u64,
    pub overhealing: u64,
    pub absorbed: u64,
    pub critical: bool,
    pub unit_state: Option<UnitState>,
}

impl HealEvent {
    pub fn effective_healing(&self) -> u64 {
        self.amount.saturating_sub(self.overhealing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuraType {
    Buff,
    Debuff,
}

impl AuraType {
    fn from_token(token: &Token) -> Option<Self> {
        match token.as_str()? {
            "BUFF" => Some(AuraType::Buff),
            "DEBUFF" => Some(AuraType::Debuff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuraEvent {
    pub header: EventHeader,
    pub spell: SpellInfo,
    pub aura_type: Option<AuraType>,
    pub stacks: u32,
}

/// Damage soaked by a shield. The header's source is the attacker and its
/// dest the protected target.
#[derive(Debug, Clone, Serialize)]
pub struct AbsorbEvent {
    pub header: EventHeader,
    pub absorbed_spell: Option<SpellInfo>,
    pub absorber: Unit,
    pub shield: SpellInfo,
    pub amount: u64,
    pub critical: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EncounterEvent {
    pub header: EventHeader,
    pub encounter_id: u32,
    pub encounter_name: String,
    pub difficulty_id: u32,
    pub group_size: u32,
    pub instance_id: u32,
    pub success: Option<bool>,
    pub duration_ms: Option<u64>,
}

impl EncounterEvent {
    pub fn is_start(&self) -> bool {
        self.header.event_type == "ENCOUNTER_START"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChallengeModeEvent {
    pub header: EventHeader,
    pub zone_name: String,
    pub instance_id: u32,
    pub challenge_id: u32,
    pub keystone_level: u32,
    pub affix_ids: Vec<u32>,
    pub success: Option<bool>,
    pub duration_secs: Option<f64>,
}

impl ChallengeModeEvent {
    pub fn is_start(&self) -> bool {
        self.header.event_type == "CHALLENGE_MODE_START"
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PrimaryStats {
    pub strength: u32,
    pub agility: u32,
    pub stamina: u32,
    pub intelligence: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SecondaryStats {
    pub dodge: f64,
    pub parry: f64,
    pub block: f64,
    pub crit_melee: f64,
    pub crit_ranged: f64,
    pub crit_spell: f64,
    pub speed: f64,
    pub lifesteal: f64,
    pub haste_melee: f64,
    pub haste_ranged: f64,
    pub haste_spell: f64,
    pub avoidance: f64,
    pub mastery: f64,
    pub versatility_damage: f64,
    pub versatility_healing: f64,
    pub versatility_taken: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Talent {
    pub node_id: u32,
    pub entry_id: u32,
    pub rank: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EquippedItem {
    pub item_id: u32,
    pub item_level: u32,
    pub enchants: Vec<u32>,
    pub bonus_ids: Vec<u32>,
    pub gems: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombatantAura {
    pub caster_guid: String,
    pub spell_id: u32,
    pub stacks: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombatantInfoEvent {
    pub header: EventHeader,
    pub player_guid: String,
    pub faction: u32,
    pub primary: PrimaryStats,
    pub secondary: SecondaryStats,
    pub armor: u32,
    pub spec_id: u32,
    pub talents: Vec<Talent>,
    pub pvp_talents: Vec<u32>,
    pub items: Vec<EquippedItem>,
    pub auras: Vec<CombatantAura>,
}

impl CombatantInfoEvent {
    /// Mean item level over occupied slots.
    pub fn average_item_level(&self) -> Option<f64> {
        let levels: Vec<u32> = self
            .items
            .iter()
            .filter(|item| item.item_id != 0 && item.item_level > 0)
            .map(|item| item.item_level)
            .collect();
        if levels.is_empty() {
            return None;
        }
        Some(levels.iter().map(|&l| l as f64).sum::<f64>() / levels.len() as f64)
    }
}

/// One materialized log line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CombatEvent {
    Base(BaseEvent),
    Spell(SpellEvent),
    Damage(DamageEvent),
    Heal(HealEvent),
    Aura(AuraEvent),
    Absorb(AbsorbEvent),
    Encounter(EncounterEvent),
    ChallengeMode(ChallengeModeEvent),
    CombatantInfo(CombatantInfoEvent),
}

impl CombatEvent {
    pub fn header(&self) -> &EventHeader {
        match self {
            CombatEvent::Base(e) => &e.header,
            CombatEvent::Spell(e) => &e.header,
            CombatEvent::Damage(e) => &e.header,
            CombatEvent::Heal(e) => &e.header,
            CombatEvent::Aura(e) => &e.header,
            CombatEvent::Absorb(e) => &e.header,
            CombatEvent::Encounter(e) => &e.header,
            CombatEvent::ChallengeMode(e) => &e.header,
            CombatEvent::CombatantInfo(e) => &e.header,
        }
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.header().timestamp
    }

    pub fn event_type(&self) -> &str {
        &self.header().event_type
    }

    pub fn source(&self) -> &Unit {
        &self.header().source
    }

    pub fn dest(&self) -> &Unit {
        &self.header().dest
    }

    pub fn spell(&self) -> Option<&SpellInfo> {
        match self {
            CombatEvent::Spell(e) => Some(&e.spell),
            CombatEvent::Damage(e) => Some(&e.spell),
            CombatEvent::Heal(e) => Some(&e.spell),
            CombatEvent::Aura(e) => Some(&e.spell),
            CombatEvent::Absorb(e) => Some(&e.shield),
            _ => None,
        }
    }

    pub fn spell_id(&self) -> Option<u32> {
        self.spell().map(|s| s.id)
    }

    pub fn unit_state(&self) -> Option<&UnitState> {
        match self {
            CombatEvent::Spell(e) => e.unit_state.as_ref(),
            CombatEvent::Damage(e) => e.unit_state.as_ref(),
            CombatEvent::Heal(e) => e.unit_state.as_ref(),
            _ => None,
        }
    }
}

/// Turns tokenized lines into [`CombatEvent`]s. Never fails: missing
/// fields are zero-filled.
#[derive(Debug, Clone, Default)]
pub struct EventFactory {
    config: FactoryConfig,
}

impl EventFactory {
    pub fn new(config: FactoryConfig) -> Self {
        EventFactory { config }
    }

    pub fn create(&self, line: &ParsedLine) -> CombatEvent {
        let header = EventHeader::from_line(line);
        let event_type = line.event_type.as_str();

        match event_type {
            "ENCOUNTER_START" | "ENCOUNTER_END" => {
                return CombatEvent::Encounter(encounter_event(header, &line.suffix))
            }
            "CHALLENGE_MODE_START" | "CHALLENGE_MODE_END" => {
                return CombatEvent::ChallengeMode(challenge_mode_event(header, &line.suffix))
            }
            "COMBATANT_INFO" => {
                return CombatEvent::CombatantInfo(combatant_info(header, &line.suffix))
            }
            "SPELL_ABSORBED" => return CombatEvent::Absorb(absorb_event(header, line)),
            _ => {}
        }

        if self.is_damage_type(event_type) {
            return CombatEvent::Damage(damage_event(header, line));
        }
        if event_type.ends_with("_HEAL") && line.prefix.len() >= 3 {
            return CombatEvent::Heal(heal_event(header, line));
        }
        if event_type.contains("_AURA_") && line.prefix.len() >= 3 {
            let payload = line.payload();
            let stacks = if event_type.ends_with("_DOSE") {
                u32_at(payload, 1).max(1)
            } else {
                1
            };
            return CombatEvent::Aura(AuraEvent {
                header,
                spell: SpellInfo::from_tokens(&line.prefix),
                aura_type: payload.iter().find_map(AuraType::from_token),
                stacks,
            });
        }
        if line.prefix.len() >= 3 {
            return CombatEvent::Spell(SpellEvent {
                header,
                spell: SpellInfo::from_tokens(&line.prefix),
                extra: line.payload().to_vec(),
                unit_state: line.unit_state().map(UnitState::from_tokens),
            });
        }

        let mut fields = line.prefix.clone();
        fields.extend(line.suffix.iter().cloned());
        CombatEvent::Base(BaseEvent { header, fields })
    }

    /// Exactly one swing representation is materialized as damage.
    fn is_damage_type(&self, event_type: &str) -> bool {
        match event_type {
            "SWING_DAMAGE" => self.config.swing == SwingRepresentation::SwingDamage,
            "SWING_DAMAGE_LANDED" => self.config.swing == SwingRepresentation::SwingDamageLanded,
            "DAMAGE_SPLIT" | "DAMAGE_SHIELD" => true,
            _ => event_type.ends_with("_DAMAGE"),
        }
    }
}

/// Newer clients insert baseAmount after amount. The shifted layout puts
/// the absorbed integer at index 6 and the critical flag at index 7; the
/// older layout has at most 10 fields.
fn damage_has_base_amount(payload: &[Token]) -> bool {
    payload.len() >= 11
        && matches!(payload[6], Token::Int(_))
        && (payload[7].is_flag_like() || matches!(payload[7], Token::Int(0 | 1)))
}

fn damage_event(header: EventHeader, line: &ParsedLine) -> DamageEvent {
    let payload = line.payload();
    let shift = usize::from(damage_has_base_amount(payload));
    let amount = u64_at(payload, 0);
    let school = u32_at(payload, 2 + shift);

    let spell = if line.prefix.len() >= 3 {
        SpellInfo::from_tokens(&line.prefix)
    } else if line.event_type.starts_with("ENVIRONMENTAL_") {
        SpellInfo {
            id: 0,
            name: text_at(&line.prefix, 0),
            school,
        }
    } else {
        SpellInfo::melee()
    };

    DamageEvent {
        header,
        spell,
        amount,
        base_amount: if shift == 1 { u64_at(payload, 1) } else { amount },
        // -1 means "no overkill"
        overkill: int_at(payload, 1 + shift).max(0) as u64,
        school,
        resisted: u64_at(payload, 3 + shift),
        blocked: u64_at(payload, 4 + shift),
        absorbed: u64_at(payload, 5 + shift),
        critical: flag_at(payload, 6 + shift),
        glancing: flag_at(payload, 7 + shift),
        crushing: flag_at(payload, 8 + shift),
        is_offhand: flag_at(payload, 9 + shift),
        unit_state: line.unit_state().map(UnitState::from_tokens),
    }
}

fn heal_event(header: EventHeader, line: &ParsedLine) -> HealEvent {
    let payload = line.payload();
    let shift = usize::from(payload.len() >= 5);
    let amount = u64_at(payload, 0);
    HealEvent {
        header,
        spell: SpellInfo::from_tokens(&line.prefix),
        amount,
        base_amount: if shift == 1 { u64_at(payload, 1) } else { amount },
        overhealing: u64_at(payload, 1 + shift),
        absorbed: u64_at(payload, 2 + shift),
        critical: flag_at(payload, 3 + shift),
        unit_state: line.unit_state().map(UnitState::from_tokens),
    }
}

fn absorb_event(header: EventHeader, line: &ParsedLine) -> AbsorbEvent {
    let suffix = &line.suffix;
    AbsorbEvent {
        header,
        absorbed_spell: (line.prefix.len() >= 3).then(|| SpellInfo::from_tokens(&line.prefix)),
        absorber: Unit::from_tokens(&line.base, 8),
        shield: SpellInfo::from_tokens(suffix),
        amount: u64_at(suffix, 3),
        critical: suffix.len() > 4 && suffix.last().map(Token::as_flag).unwrap_or(false),
    }
}

fn encounter_event(header: EventHeader, params: &[Token]) -> EncounterEvent {
    let is_end = header.event_type == "ENCOUNTER_END";
    EncounterEvent {
        encounter_id: u32_at(params, 0),
        encounter_name: text_at(params, 1),
        difficulty_id: u32_at(params, 2),
        group_size: u32_at(params, 3),
        instance_id: if is_end { 0 } else { u32_at(params, 4) },
        success: is_end.then(|| int_at(params, 4) == 1),
        duration_ms: is_end.then(|| u64_at(params, 5)),
        header,
    }
}

fn challenge_mode_event(header: EventHeader, params: &[Token]) -> ChallengeModeEvent {
    if header.event_type == "CHALLENGE_MODE_END" {
        return ChallengeModeEvent {
            zone_name: String::new(),
            instance_id: u32_at(params, 0),
            challenge_id: 0,
            keystone_level: u32_at(params, 2),
            affix_ids: Vec::new(),
            success: Some(int_at(params, 1) == 1),
            duration_secs: Some(u64_at(params, 3) as f64 / 1000.0),
            header,
        };
    }

    ChallengeModeEvent {
        zone_name: text_at(params, 0),
        instance_id: u32_at(params, 1),
        challenge_id: u32_at(params, 2),
        keystone_level: u32_at(params, 3),
        affix_ids: params
            .get(4)
            .map(|t| t.items().iter().map(Token::as_u32).collect())
            .unwrap_or_default(),
        success: None,
        duration_secs: None,
        header,
    }
}

const COMBATANT_SPEC_INDEX: usize = 23;

/// Elements of the group `offset` places after the talent list.
fn group_after(params: &[Token], talents_at: Option<usize>, offset: usize) -> &[Token] {
    talents_at
        .and_then(|i| params.get(i + offset))
        .map(Token::items)
        .unwrap_or(&[])
}

fn combatant_info(header: EventHeader, params: &[Token]) -> CombatantInfoEvent {
    // The specialization id sits right before the talent list. Older layouts without
    // any list fall back to the fixed index.
    let talents_at = params.iter().position(Token::is_group);
    let spec_index = talents_at
        .and_then(|i| i.checked_sub(1))
        .unwrap_or(COMBATANT_SPEC_INDEX);
    let group = |offset: usize| group_after(params, talents_at, offset);

    CombatantInfoEvent {
        player_guid: guid_of(params.first()),
        faction: u32_at(params, 1),
        primary: PrimaryStats {
            strength: u32_at(params, 2),
            agility: u32_at(params, 3),
            stamina: u32_at(params, 4),
            intelligence: u32_at(params, 5),
        },
        secondary: SecondaryStats {
            dodge: f64_at(params, 6),
            parry: f64_at(params, 7),
            block: f64_at(params, 8),
            crit_melee: f64_at(params, 9),
            crit_ranged: f64_at(params, 10),
            crit_spell: f64_at(params, 11),
            speed: f64_at(params, 12),
            lifesteal: f64_at(params, 13),
            haste_melee: f64_at(params, 14),
            haste_ranged: f64_at(params, 15),
            haste_spell: f64_at(params, 16),
            avoidance: f64_at(params, 17),
            mastery: f64_at(params, 18),
            versatility_damage: f64_at(params, 19),
            versatility_healing: f64_at(params, 20),
            versatility_taken: f64_at(params, 21),
        },
        armor: u32_at(params, spec_index.saturating_sub(1)),
        spec_id: u32_at(params, spec_index),
        talents: group(0)
            .iter()
            .map(|t| {
                let fields = t.items();
                Talent {
                    node_id: u32_at(fields, 0),
                    entry_id: u32_at(fields, 1),
                    rank: u32_at(fields, 2),
                }
            })
            .collect(),
        pvp_talents: group(1).iter().map(Token::as_u32).collect(),
        items: group(2)
            .iter()
            .map(|t| {
                let fields = t.items();
                let ids = |i: usize| -> Vec<u32> {
                    fields
                        .get(i)
                        .map(|g| g.items().iter().map(Token::as_u32).collect())
                        .unwrap_or_default()
                };
                EquippedItem {
                    item_id: u32_at(fields, 0),
                    item_level: u32_at(fields, 1),
                    enchants: ids(2),
                    bonus_ids: ids(3),
                    gems: ids(4),
                }
            })
            .collect(),
        auras: group(3)
            .chunks_exact(3)
            .map(|chunk| CombatantAura {
                caster_guid: guid_of(chunk.first()),
                spell_id: u32_at(chunk, 1),
                stacks: u32_at(chunk, 2),
            })
            .collect(),
        header,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::LineTokenizer;

    const PLAYER: &str = "Player-1111-00000001";
    const CREATURE: &str = "Creature-0-3133-2549-12345-209090-0000000001";

    fn build_line(event_type: &str, fields: &[&str]) -> String {
        let mut line = format!("9/18/2025 20:23:42.758-4  {event_type}");
        for field in fields {
            line.push(',');
            line.push_str(field);
        }
        line
    }

    fn units() -> Vec<&'static str> {
        vec![PLAYER, "\"Arakara-Illidan-US\"", "0x514", "0x0", CREATURE, "\"Training Dummy\"", "0x10a48", "0x0"]
    }

    fn create(event_type: &str, extra: &[&str]) -> CombatEvent {
        create_with(EventFactory::default(), event_type, extra)
    }

    fn create_with(factory: EventFactory, event_type: &str, extra: &[&str]) -> CombatEvent {
        let mut fields = units();
        fields.extend_from_slice(extra);
        meta(factory, event_type, &fields)
    }

    /// Lines without the source/dest unit block.
    fn meta(factory: EventFactory, event_type: &str, fields: &[&str]) -> CombatEvent {
        let mut tokenizer = LineTokenizer::default();
        let line = tokenizer.parse(&build_line(event_type, fields)).unwrap();
        factory.create(&line)
    }

    fn unit_state_fields() -> Vec<&'static str> {
        vec![
            "Pet-0-3133-2549-12345-165189-0000000002", PLAYER, "900000", "1000000", "5000", "8000",
            "3000", "0", "0", "100", "100", "0", "-1234.5", "678.9", "2166", "1.57", "80", "0", "0",
        ]
    }

    #[test]
    fn classic_damage_layout() {
        let event = create("SPELL_DAMAGE", &["133", "\"Fireball\"", "0x4", "12500", "-1", "4", "0", "0", "0", "1", "nil", "nil"]);
        let CombatEvent::Damage(damage) = event else { panic!("expected damage") };
        assert_eq!(damage.amount, 12500);
        assert_eq!(damage.base_amount, 12500);
        assert_eq!(damage.overkill, 0);
        assert_eq!(damage.school, 4);
        assert!(damage.critical);
        assert!(!damage.glancing);
        assert_eq!(damage.spell.name, "Fireball");
        assert_eq!(damage.header.source.name, "Arakara-Illidan-US");
    }

    #[test]
    fn modern_damage_layout_with_unit_state() {
        let mut extra = vec!["133", "\"Fireball\"", "0x4"];
        extra.extend(unit_state_fields());
        extra.extend(["300", "250", "40", "4", "0", "0", "10", "nil", "nil", "nil", "nil"]);
        let CombatEvent::Damage(damage) = create("SPELL_DAMAGE", &extra) else { panic!("expected damage") };
        assert_eq!(damage.amount, 300);
        assert_eq!(damage.base_amount, 250);
        assert_eq!(damage.overkill, 40);
        assert_eq!(damage.absorbed, 10);
        let state = damage.unit_state.unwrap();
        assert_eq!(state.owner_guid, PLAYER);
        assert_eq!(state.max_hp, 1_000_000);
        assert_eq!(state.level, 80);
        assert_eq!(state.extra.len(), 2);
    }

    #[test]
    fn heal_layouts_and_effective_clamp() {
        let CombatEvent::Heal(heal) = create("SPELL_HEAL", &["2061", "\"Flash Heal\"", "0x2", "8500", "1500", "0", "nil"]) else {
            panic!("expected heal")
        };
        assert_eq!(heal.overhealing, 1500);
        assert_eq!(heal.effective_healing(), 7000);

        let CombatEvent::Heal(heal) = create("SPELL_HEAL", &["2061", "\"Flash Heal\"", "0x2", "500", "500", "900", "0", "1"]) else {
            panic!("expected heal")
        };
        assert_eq!(heal.base_amount, 500);
        assert_eq!(heal.overhealing, 900);
        assert!(heal.critical);
        assert_eq!(heal.effective_healing(), 0);
    }

    #[test]
    fn swing_representation_is_chosen_once() {
        let payload = ["1000", "-1", "1", "0", "0", "0", "nil", "nil", "nil", "nil"];
        assert!(matches!(create("SWING_DAMAGE", &payload), CombatEvent::Damage(_)));
        assert!(matches!(create("SWING_DAMAGE_LANDED", &payload), CombatEvent::Base(_)));

        let landed = EventFactory::new(FactoryConfig {
            swing: SwingRepresentation::SwingDamageLanded,
        });
        assert!(matches!(create_with(landed.clone(), "SWING_DAMAGE", &payload), CombatEvent::Base(_)));
        let CombatEvent::Damage(damage) = create_with(landed, "SWING_DAMAGE_LANDED", &payload) else {
            panic!("expected damage")
        };
        assert_eq!(damage.spell, SpellInfo::melee());
        assert_eq!(damage.amount, 1000);
    }

    #[test]
    fn environmental_damage_names_the_environment() {
        let CombatEvent::Damage(damage) = create("ENVIRONMENTAL_DAMAGE", &["\"Falling\"", "4200", "-1", "1", "0", "0", "0", "nil", "nil", "nil"])
        else {
            panic!("expected damage")
        };
        assert_eq!(damage.spell.name, "Falling");
        assert_eq!(damage.amount, 4200);
    }

    #[test]
    fn aura_polarity_and_dose() {
        let CombatEvent::Aura(aura) = create("SPELL_AURA_APPLIED", &["1459", "\"Arcane Intellect\"", "0x40", "BUFF"]) else {
            panic!("expected aura")
        };
        assert_eq!(aura.aura_type, Some(AuraType::Buff));
        assert_eq!(aura.stacks, 1);

        let CombatEvent::Aura(aura) = create("SPELL_AURA_APPLIED_DOSE", &["12", "\"Stack\"", "0x1", "DEBUFF", "4"]) else {
            panic!("expected aura")
        };
        assert_eq!(aura.aura_type, Some(AuraType::Debuff));
        assert_eq!(aura.stacks, 4);

        let CombatEvent::Aura(aura) = create("SPELL_AURA_REMOVED", &["12", "\"Stack\"", "0x1"]) else {
            panic!("expected aura")
        };
        assert_eq!(aura.aura_type, None);
    }

    #[test]
    fn absorb_event_identities() {
        let extra = [
            "Player-1111-00000002", "\"Priest-Illidan-US\"", "0x514", "0x0",
            "17", "\"Power Word: Shield\"", "0x2", "900", "900", "nil",
        ];
        let CombatEvent::Absorb(absorb) = create("SPELL_ABSORBED", &extra) else { panic!("expected absorb") };
        assert!(absorb.absorbed_spell.is_none());
        assert_eq!(absorb.absorber.guid, "Player-1111-00000002");
        assert_eq!(absorb.shield.id, 17);
        assert_eq!(absorb.amount, 900);
        assert_eq!(absorb.header.dest.guid, CREATURE);
    }

    #[test]
    fn encounter_boundaries() {
        let factory = EventFactory::default();
        let CombatEvent::Encounter(start) = meta(factory.clone(), "ENCOUNTER_START", &["2820", "\"Gnarlroot\"", "16", "20", "2549"])
        else {
            panic!("expected encounter")
        };
        assert_eq!(start.encounter_id, 2820);
        assert!(start.is_start());
        assert_eq!(start.instance_id, 2549);
        assert!(start.success.is_none());
        assert!(start.header.source.is_empty());

        let CombatEvent::Encounter(end) = meta(factory, "ENCOUNTER_END", &["2820", "\"Gnarlroot\"", "16", "20", "1", "245123"])
        else {
            panic!("expected encounter")
        };
        assert!(!end.is_start());
        assert_eq!(end.success, Some(true));
        assert_eq!(end.duration_ms, Some(245123));
    }

    #[test]
    fn challenge_mode_boundaries() {
        let factory = EventFactory::default();
        let CombatEvent::ChallengeMode(start) =
            meta(factory.clone(), "CHALLENGE_MODE_START", &["\"The Dawnbreaker\"", "2662", "505", "12", "[10,147,9]"])
        else {
            panic!("expected challenge mode")
        };
        assert_eq!(start.zone_name, "The Dawnbreaker");
        assert_eq!(start.keystone_level, 12);
        assert_eq!(start.affix_ids, vec![10, 147, 9]);

        let CombatEvent::ChallengeMode(end) =
            meta(factory, "CHALLENGE_MODE_END", &["2662", "1", "12", "1745000", "310.5", "2874.1"])
        else {
            panic!("expected challenge mode")
        };
        assert_eq!(end.success, Some(true));
        assert_eq!(end.duration_secs, Some(1745.0));
    }

    #[test]
    fn combatant_info_snapshot() {
        let mut fields: Vec<String> = vec![PLAYER.to_string(), "1".to_string()];
        fields.extend((2..22).map(|i| i.to_string()));
        fields.push("4500".to_string());
        fields.push("62".to_string());
        fields.push("[(1,2,1),(3,4,2)]".to_string());
        fields.push("(0,0,0,0)".to_string());
        fields.push("[(212000,489,(),(1,2),()),(0,0,(),(),()),(212001,493,(7000),(),(5))]".to_string());
        fields.push(format!("[{PLAYER},1459,1]"));
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();

        let CombatEvent::CombatantInfo(info) = meta(EventFactory::default(), "COMBATANT_INFO", &refs) else {
            panic!("expected combatant info")
        };
        assert_eq!(info.player_guid, PLAYER);
        assert_eq!(info.spec_id, 62);
        assert_eq!(info.armor, 4500);
        assert_eq!(info.primary.strength, 2);
        assert_eq!(info.talents.len(), 2);
        assert_eq!(info.talents[1].rank, 2);
        assert_eq!(info.pvp_talents, vec![0, 0, 0, 0]);
        assert_eq!(info.items.len(), 3);
        assert_eq!(info.items[2].enchants, vec![7000]);
        assert_eq!(info.average_item_level(), Some(491.0));
        assert_eq!(info.auras, vec![CombatantAura { caster_guid: PLAYER.to_string(), spell_id: 1459, stacks: 1 }]);
    }

    #[test]
    fn unknown_types_preserve_fields() {
        let event = create("SPELL_MADE_UP", &[]);
        assert!(matches!(event, CombatEvent::Base(_)));

        let CombatEvent::Base(died) = create("UNIT_DIED", &["0"]) else { panic!("expected base") };
        assert_eq!(died.header.dest.guid, CREATURE);
        assert_eq!(died.fields, vec![Token::Int(0)]);
    }

    #[test]
    fn truncated_damage_is_zero_filled() {
        let CombatEvent::Damage(damage) = create("SPELL_DAMAGE", &["133", "\"Fireball\"", "0x4", "77"]) else {
            panic!("expected damage")
        };
        assert_eq!(damage.amount, 77);
        assert_eq!(damage.overkill, 0);
        assert!(!damage.critical);
        assert!(damage.unit_state.is_none());
    }
}
