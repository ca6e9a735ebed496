use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::config::CombatPeriodConfig;
use crate::events::CombatEvent;
use crate::models::seconds_between;

/// A maximal run of combat activity.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct CombatPeriod {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub event_count: usize,
}

impl CombatPeriod {
    fn starting_at(timestamp: NaiveDateTime) -> Self {
        CombatPeriod {
            start_time: timestamp,
            end_time: timestamp,
            event_count: 1,
        }
    }

    pub fn duration(&self) -> f64 {
        seconds_between(self.start_time, self.end_time)
    }

    /// Inclusive on both ends.
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        self.start_time <= timestamp && timestamp <= self.end_time
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PeriodValidationError {
    #[error("period {index} ends before it starts")]
    Inverted { index: usize },

    #[error("period {index} does not end strictly before period {next} starts")]
    Overlapping { index: usize, next: usize },
}

/// Clusters combat-indicating events into periods by gap analysis.
///
/// Independent from the segmenter's trash timeout: this one only feeds
/// activity and combat-time accounting.
#[derive(Debug, Clone, Default)]
pub struct CombatPeriodDetector {
    config: CombatPeriodConfig,
}

impl CombatPeriodDetector {
    pub fn new(config: CombatPeriodConfig) -> Self {
        CombatPeriodDetector { config }
    }

    pub fn with_gap(gap_threshold_secs: f64) -> Self {
        Self::new(CombatPeriodConfig::fixed(gap_threshold_secs))
    }

    pub fn is_combat_event(&self, event_type: &str) -> bool {
        self.config.combat_types.iter().any(|t| t == event_type)
            || self
                .config
                .combat_suffixes
                .iter()
                .any(|suffix| event_type.ends_with(suffix.as_str()))
    }

    pub fn detect<'a, I>(&self, events: I) -> Vec<CombatPeriod>
    where
        I: IntoIterator<Item = &'a CombatEvent>,
    {
        let times = events
            .into_iter()
            .filter(|e| self.is_combat_event(e.event_type()))
            .map(CombatEvent::timestamp)
            .collect();
        self.detect_times(times)
    }

    /// Cluster raw timestamps that are already known to be combat activity.
    pub fn detect_times(&self, mut times: Vec<NaiveDateTime>) -> Vec<CombatPeriod> {
        let Some(&first) = times.iter().min() else {
            return Vec::new();
        };
        times.sort();

        let gaps: Vec<f64> = times
            .windows(2)
            .map(|pair| seconds_between(pair[0], pair[1]))
            .collect();
        let threshold = self.threshold(&gaps);

        let mut periods = Vec::new();
        let mut current = CombatPeriod::starting_at(first);
        for (gap, &timestamp) in gaps.iter().zip(times.iter().skip(1)) {
            if *gap > threshold {
                periods.push(current);
                current = CombatPeriod::starting_at(timestamp);
            } else {
                current.end_time = timestamp;
                current.event_count += 1;
            }
        }
        periods.push(current);

        debug_assert!(Self::validate(&periods).is_ok());
        periods
    }

    /// Gap above which a period closes.
    pub fn threshold(&self, gaps: &[f64]) -> f64 {
        if let Some(fixed) = self.config.gap_threshold_secs {
            return fixed.max(0.0);
        }
        if self.config.adaptive {
            if let Some(median) = median(gaps) {
                return (median * self.config.adaptive_multiplier).max(self.config.adaptive_min_secs);
            }
        }
        self.config.fallback_gap_secs
    }

    /// Coalesce periods separated by at most `merge_threshold` seconds.
    pub fn merge_close_periods(periods: &[CombatPeriod], merge_threshold: f64) -> Vec<CombatPeriod> {
        let mut sorted = periods.to_vec();
        sorted.sort_by_key(|p| p.start_time);

        let mut merged: Vec<CombatPeriod> = Vec::with_capacity(sorted.len());
        for period in sorted {
            match merged.last_mut() {
                Some(last) if seconds_between(last.end_time, period.start_time) <= merge_threshold => {
                    last.end_time = last.end_time.max(period.end_time);
                    last.event_count += period.event_count;
                }
                _ => merged.push(period),
            }
        }
        merged
    }

    /// Periods must be well-formed and strictly ordered. A failure is a bug
    /// in whoever built the list.
    pub fn validate(periods: &[CombatPeriod]) -> Result<(), PeriodValidationError> {
        for (index, period) in periods.iter().enumerate() {
            if period.end_time < period.start_time {
                return Err(PeriodValidationError::Inverted { index });
            }
            if let Some(next) = periods.get(index + 1) {
                if period.end_time >= next.start_time {
                    return Err(PeriodValidationError::Overlapping {
                        index,
                        next: index + 1,
                    });
                }
            }
        }
        Ok(())
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn total_combat_time(periods: &[CombatPeriod]) -> f64 {
    periods.iter().map(CombatPeriod::duration).sum()
}

/// Share of `total_duration` spent in combat, 0-100.
pub fn combat_percentage(periods: &[CombatPeriod], total_duration: f64) -> f64 {
    if total_duration <= 0.0 {
        return 0.0;
    }
    (total_combat_time(periods) / total_duration * 100.0).min(100.0)
}

pub fn period_index_at(periods: &[CombatPeriod], timestamp: NaiveDateTime) -> Option<usize> {
    periods.iter().position(|p| p.contains(timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate};

    use crate::events::{BaseEvent, EventHeader, EventRef, Unit};

    fn at(secs: f64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, 18)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap()
            + Duration::milliseconds((secs * 1000.0) as i64)
    }

    fn event(event_type: &str, secs: f64) -> EventRef {
        Arc::new(CombatEvent::Base(BaseEvent {
            header: EventHeader {
                timestamp: at(secs),
                line_number: 0,
                event_type: event_type.to_string(),
                source: Unit::default(),
                dest: Unit::default(),
                raw_line: String::new(),
            },
            fields: Vec::new(),
        }))
    }

    fn period(start: f64, end: f64) -> CombatPeriod {
        CombatPeriod {
            start_time: at(start),
            end_time: at(end),
            event_count: 1,
        }
    }

    #[test]
    fn close_events_form_one_period() {
        let detector = CombatPeriodDetector::with_gap(5.0);
        let events: Vec<EventRef> = [0.0, 2.0, 4.0].iter().map(|&t| event("SPELL_DAMAGE", t)).collect();
        let periods = detector.detect(events.iter().map(|e| e.as_ref()));
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].start_time, at(0.0));
        assert_eq!(periods[0].end_time, at(4.0));
        assert_eq!(periods[0].event_count, 3);
        assert_eq!(periods[0].duration(), 4.0);
    }

    #[test]
    fn large_gap_opens_a_point_period() {
        let detector = CombatPeriodDetector::with_gap(5.0);
        let events: Vec<EventRef> = [0.0, 2.0, 4.0, 20.0]
            .iter()
            .map(|&t| event("SPELL_DAMAGE", t))
            .collect();
        let periods = detector.detect(events.iter().map(|e| e.as_ref()));
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[1].start_time, at(20.0));
        assert_eq!(periods[1].event_count, 1);
        assert_eq!(periods[1].duration(), 0.0);
        for pair in periods.windows(2) {
            assert!(pair[0].end_time < pair[1].start_time);
        }
    }

    #[test]
    fn gap_equal_to_threshold_extends() {
        let detector = CombatPeriodDetector::with_gap(5.0);
        let periods = detector.detect_times(vec![at(0.0), at(5.0), at(10.001)]);
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].end_time, at(5.0));
    }

    #[test]
    fn non_combat_events_are_ignored() {
        let detector = CombatPeriodDetector::default();
        let events = [
            event("SPELL_DAMAGE", 0.0),
            event("COMBATANT_INFO", 2.0),
            event("SPELL_AURA_APPLIED_DOSE", 3.0),
            event("UNIT_DIED", 4.0),
            event("SPELL_PERIODIC_HEAL", 30.0),
        ];
        let periods = detector.detect(events.iter().map(|e| e.as_ref()));
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].event_count, 2);
        assert_eq!(periods[0].end_time, at(4.0));
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let detector = CombatPeriodDetector::with_gap(5.0);
        let periods = detector.detect_times(vec![at(4.0), at(0.0), at(2.0)]);
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].start_time, at(0.0));
    }

    #[test]
    fn adaptive_threshold_uses_median_with_floor() {
        let detector = CombatPeriodDetector::new(CombatPeriodConfig::adaptive(3.0));
        assert_eq!(detector.threshold(&[1.0, 2.0, 3.0]), 6.0);
        assert_eq!(detector.threshold(&[0.1, 0.1, 0.2, 0.2]), 1.0);
        // nothing to take a median of
        assert_eq!(detector.threshold(&[]), 5.0);
        assert_eq!(CombatPeriodDetector::default().threshold(&[100.0]), 5.0);
    }

    #[test]
    fn empty_input_yields_no_periods() {
        assert!(CombatPeriodDetector::default().detect_times(Vec::new()).is_empty());
    }

    #[test]
    fn merge_coalesces_small_gaps() {
        let periods = vec![period(0.0, 4.0), period(6.0, 8.0), period(20.0, 21.0)];
        let merged = CombatPeriodDetector::merge_close_periods(&periods, 2.0);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].end_time, at(8.0));
        assert_eq!(merged[0].event_count, 2);
        assert!(CombatPeriodDetector::validate(&merged).is_ok());
    }

    #[test]
    fn validate_rejects_bad_lists() {
        assert_eq!(
            CombatPeriodDetector::validate(&[period(5.0, 1.0)]),
            Err(PeriodValidationError::Inverted { index: 0 })
        );
        assert_eq!(
            CombatPeriodDetector::validate(&[period(0.0, 5.0), period(3.0, 8.0)]),
            Err(PeriodValidationError::Overlapping { index: 0, next: 1 })
        );
        // touching is not strictly ordered
        assert!(CombatPeriodDetector::validate(&[period(0.0, 5.0), period(5.0, 8.0)]).is_err());
        assert!(CombatPeriodDetector::validate(&[period(0.0, 5.0), period(5.5, 8.0)]).is_ok());
        assert!(CombatPeriodDetector::validate(&[]).is_ok());
    }

    #[test]
    fn helpers() {
        let periods = vec![period(0.0, 4.0), period(10.0, 16.0)];
        assert_eq!(total_combat_time(&periods), 10.0);
        assert_eq!(combat_percentage(&periods, 20.0), 50.0);
        assert_eq!(combat_percentage(&periods, 0.0), 0.0);
        assert_eq!(period_index_at(&periods, at(12.0)), Some(1));
        assert_eq!(period_index_at(&periods, at(4.0)), Some(0));
        assert_eq!(period_index_at(&periods, at(7.0)), None);
    }
}
