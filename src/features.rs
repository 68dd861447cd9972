//! Point-in-time features for player points prediction.
//!
//! Every rolling and exponentially weighted value attached to a player's
//! appearance is computed from that player's earlier appearances only: the
//! series is aggregated and then shifted one position forward. The label
//! (`player_points`) is the only same-event value a row carries as a target.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

pub const PLAYER_WINDOWS: [usize; 2] = [5, 10];
pub const EWM_SPANS: [usize; 2] = [5, 10];
pub const OPPONENT_WINDOW: usize = 10;
pub const DEFAULT_DAYS_REST: f64 = 7.0;
pub const MAX_DAYS_REST: f64 = 10.0;

pub const FEATURE_NAMES: [&str; 10] = [
    "player_points_last_5",
    "player_points_last_10",
    "player_points_ewm_span_5",
    "player_points_ewm_span_10",
    "ppm_last_5",
    "ppm_last_10",
    "ppm_ewm_span_5",
    "ppm_ewm_span_10",
    "days_rest",
    "opponent_avg_points_allowed_last_10",
];
pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// One player appearance joined to the team's and the opponent's game rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub player_id: i64,
    pub game_id: String,
    pub team_id: i64,
    pub minutes: f64,
    pub player_points: f64,
    pub game_date: NaiveDate,
    pub opponent_team_id: i64,
    /// Points on the opponent's game row for this event.
    pub points_allowed: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub player_id: i64,
    pub game_id: String,
    pub team_id: i64,
    pub game_date: NaiveDate,
    pub opponent_team_id: i64,
    pub minutes: f64,
    pub player_points: f64,
    pub points_allowed: Option<f64>,
    pub points_per_minute: Option<f64>,
    pub player_points_last_5: Option<f64>,
    pub player_points_last_10: Option<f64>,
    pub player_points_ewm_span_5: Option<f64>,
    pub player_points_ewm_span_10: Option<f64>,
    pub ppm_last_5: Option<f64>,
    pub ppm_last_10: Option<f64>,
    pub ppm_ewm_span_5: Option<f64>,
    pub ppm_ewm_span_10: Option<f64>,
    pub days_rest: f64,
    pub opponent_avg_points_allowed_last_10: Option<f64>,
}

impl FeatureRow {
    /// Values in `FEATURE_NAMES` order.
    pub fn feature_vector(&self) -> [Option<f64>; FEATURE_COUNT] {
        [
            self.player_points_last_5,
            self.player_points_last_10,
            self.player_points_ewm_span_5,
            self.player_points_ewm_span_10,
            self.ppm_last_5,
            self.ppm_last_10,
            self.ppm_ewm_span_5,
            self.ppm_ewm_span_10,
            Some(self.days_rest),
            self.opponent_avg_points_allowed_last_10,
        ]
    }

    /// All features present, or `None`.
    pub fn complete_features(&self) -> Option<[f64; FEATURE_COUNT]> {
        let raw = self.feature_vector();
        let mut out = [0.0; FEATURE_COUNT];
        for (slot, value) in out.iter_mut().zip(raw) {
            *slot = value.filter(|v| v.is_finite())?;
        }
        Some(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    pub rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn missing_counts(&self) -> [usize; FEATURE_COUNT] {
        let mut counts = [0usize; FEATURE_COUNT];
        for row in &self.rows {
            for (count, value) in counts.iter_mut().zip(row.feature_vector()) {
                if value.is_none() {
                    *count += 1;
                }
            }
        }
        counts
    }
}

pub fn build_features(rows: Vec<TrainingRow>) -> FeatureFrame {
    let mut rows = rows;
    rows.sort_by(player_order);

    let mut out = rows
        .into_iter()
        .map(|r| {
            let points_per_minute = (r.minutes != 0.0).then(|| r.player_points / r.minutes);
            FeatureRow {
                player_id: r.player_id,
                game_id: r.game_id,
                team_id: r.team_id,
                game_date: r.game_date,
                opponent_team_id: r.opponent_team_id,
                minutes: r.minutes,
                player_points: r.player_points,
                points_allowed: r.points_allowed,
                points_per_minute: points_per_minute.filter(|v| v.is_finite()),
                player_points_last_5: None,
                player_points_last_10: None,
                player_points_ewm_span_5: None,
                player_points_ewm_span_10: None,
                ppm_last_5: None,
                ppm_last_10: None,
                ppm_ewm_span_5: None,
                ppm_ewm_span_10: None,
                days_rest: DEFAULT_DAYS_REST,
                opponent_avg_points_allowed_last_10: None,
            }
        })
        .collect::<Vec<_>>();

    for range in player_ranges(&out) {
        apply_player_form(&mut out[range]);
    }
    apply_opponent_strength(&mut out);

    FeatureFrame { rows: out }
}

fn player_order(a: &TrainingRow, b: &TrainingRow) -> Ordering {
    a.player_id
        .cmp(&b.player_id)
        .then(a.game_date.cmp(&b.game_date))
        .then_with(|| a.game_id.cmp(&b.game_id))
}

/// Contiguous index ranges sharing a player id; rows must be player-sorted.
fn player_ranges(rows: &[FeatureRow]) -> Vec<std::ops::Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0usize;
    for idx in 1..=rows.len() {
        if idx == rows.len() || rows[idx].player_id != rows[start].player_id {
            if start < idx {
                ranges.push(start..idx);
            }
            start = idx;
        }
    }
    ranges
}

fn apply_player_form(rows: &mut [FeatureRow]) {
    let points = rows.iter().map(|r| Some(r.player_points)).collect::<Vec<_>>();
    let ppm = rows.iter().map(|r| r.points_per_minute).collect::<Vec<_>>();

    let points_last_5 = shift_one(&rolling_mean(&points, PLAYER_WINDOWS[0]));
    let points_last_10 = shift_one(&rolling_mean(&points, PLAYER_WINDOWS[1]));
    let points_ewm_5 = shift_one(&ewm_mean(&points, EWM_SPANS[0]));
    let points_ewm_10 = shift_one(&ewm_mean(&points, EWM_SPANS[1]));
    let ppm_last_5 = shift_one(&rolling_mean(&ppm, PLAYER_WINDOWS[0]));
    let ppm_last_10 = shift_one(&rolling_mean(&ppm, PLAYER_WINDOWS[1]));
    let ppm_ewm_5 = shift_one(&ewm_mean(&ppm, EWM_SPANS[0]));
    let ppm_ewm_10 = shift_one(&ewm_mean(&ppm, EWM_SPANS[1]));

    let mut prev_date: Option<NaiveDate> = None;
    for (idx, row) in rows.iter_mut().enumerate() {
        row.player_points_last_5 = points_last_5[idx];
        row.player_points_last_10 = points_last_10[idx];
        row.player_points_ewm_span_5 = points_ewm_5[idx];
        row.player_points_ewm_span_10 = points_ewm_10[idx];
        row.ppm_last_5 = ppm_last_5[idx];
        row.ppm_last_10 = ppm_last_10[idx];
        row.ppm_ewm_span_5 = ppm_ewm_5[idx];
        row.ppm_ewm_span_10 = ppm_ewm_10[idx];
        row.days_rest = days_rest(prev_date, row.game_date);
        prev_date = Some(row.game_date);
    }
}

pub fn days_rest(prev: Option<NaiveDate>, current: NaiveDate) -> f64 {
    let days = prev
        .map(|p| (current - p).num_days() as f64)
        .unwrap_or(DEFAULT_DAYS_REST);
    days.clamp(0.0, MAX_DAYS_REST)
}

#[derive(Debug, Clone)]
struct OpponentEvent {
    game_date: NaiveDate,
    game_id: String,
    points_allowed: Option<f64>,
}

/// Trailing mean over the opponent's earlier events, falling back to the
/// opponent's mean over all its events and then to the mean over every event.
fn apply_opponent_strength(rows: &mut [FeatureRow]) {
    let mut events: HashMap<i64, Vec<OpponentEvent>> = HashMap::new();
    {
        let mut seen: HashSet<(i64, &str)> = HashSet::with_capacity(rows.len());
        for row in rows.iter() {
            if !seen.insert((row.opponent_team_id, row.game_id.as_str())) {
                continue;
            }
            events.entry(row.opponent_team_id).or_default().push(OpponentEvent {
                game_date: row.game_date,
                game_id: row.game_id.clone(),
                points_allowed: row.points_allowed,
            });
        }
    }

    let mut trailing: HashMap<(i64, String), Option<f64>> = HashMap::new();
    let mut opponent_mean: HashMap<i64, Option<f64>> = HashMap::new();
    let mut global_sum = 0.0;
    let mut global_n = 0usize;

    for (opponent_id, list) in events.iter_mut() {
        list.sort_by(|a, b| {
            a.game_date
                .cmp(&b.game_date)
                .then_with(|| a.game_id.cmp(&b.game_id))
        });
        let series = list.iter().map(|e| e.points_allowed).collect::<Vec<_>>();
        let shifted = shift_one(&rolling_mean(&series, OPPONENT_WINDOW));
        for (event, value) in list.iter().zip(shifted) {
            trailing.insert((*opponent_id, event.game_id.clone()), value);
        }
        let known = series.iter().flatten().copied().collect::<Vec<_>>();
        global_sum += known.iter().sum::<f64>();
        global_n += known.len();
        opponent_mean.insert(*opponent_id, mean(&known));
    }
    let global_mean = (global_n > 0).then(|| global_sum / global_n as f64);

    for row in rows.iter_mut() {
        let key = (row.opponent_team_id, row.game_id.clone());
        row.opponent_avg_points_allowed_last_10 = trailing
            .get(&key)
            .copied()
            .flatten()
            .or_else(|| opponent_mean.get(&row.opponent_team_id).copied().flatten())
            .or(global_mean);
    }
}

/// Mean of the non-missing values among the last `window` positions, `None`
/// when there are none.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    for idx in 0..values.len() {
        let start = (idx + 1).saturating_sub(window);
        let known = values[start..=idx].iter().flatten().copied().collect::<Vec<_>>();
        out.push(mean(&known));
    }
    out
}

/// Recursive exponentially weighted mean with `alpha = 2 / (span + 1)`.
/// A missing value keeps the previous mean and decays its weight for the next
/// observation.
pub fn ewm_mean(values: &[Option<f64>], span: usize) -> Vec<Option<f64>> {
    let alpha = 2.0 / (span.max(1) as f64 + 1.0);
    let old_factor = 1.0 - alpha;
    let mut out = Vec::with_capacity(values.len());
    let mut weighted: Option<f64> = None;
    let mut old_wt = 1.0;

    for value in values {
        match (weighted, value) {
            (None, Some(v)) => {
                weighted = Some(*v);
                old_wt = 1.0;
            }
            (None, None) => {}
            (Some(prev), Some(v)) => {
                old_wt *= old_factor;
                weighted = Some((old_wt * prev + alpha * v) / (old_wt + alpha));
                old_wt = 1.0;
            }
            (Some(_), None) => {
                old_wt *= old_factor;
            }
        }
        out.push(weighted);
    }
    out
}

/// Moves every value one position later; the first position becomes `None`.
pub fn shift_one(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(None);
    out.extend_from_slice(&values[..values.len() - 1]);
    out
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn rolling_mean_uses_available_window() {
        let values = [Some(10.0), Some(20.0), None, Some(30.0)];
        let out = rolling_mean(&values, 2);
        assert!(approx(out[0], 10.0));
        assert!(approx(out[1], 15.0));
        assert!(approx(out[2], 20.0));
        assert!(approx(out[3], 30.0));
        assert_eq!(rolling_mean(&[None, None], 3), vec![None, None]);
    }

    #[test]
    fn ewm_matches_recursive_definition() {
        let values = [Some(10.0), Some(20.0), Some(30.0)];
        let out = ewm_mean(&values, 3);
        // alpha = 0.5
        assert!(approx(out[0], 10.0));
        assert!(approx(out[1], 15.0));
        assert!(approx(out[2], 22.5));
    }

    #[test]
    fn ewm_decays_across_missing_values() {
        let out = ewm_mean(&[Some(10.0), None, Some(20.0)], 3);
        assert!(approx(out[1], 10.0));
        // old weight 0.25 against alpha 0.5
        assert!(approx(out[2], (0.25 * 10.0 + 0.5 * 20.0) / 0.75));
        assert_eq!(ewm_mean(&[None, Some(4.0)], 3), vec![None, Some(4.0)]);
    }

    #[test]
    fn shift_moves_values_forward() {
        assert_eq!(shift_one(&[Some(1.0), Some(2.0)]), vec![None, Some(1.0)]);
        assert!(shift_one(&[]).is_empty());
    }

    #[test]
    fn rest_days_are_clipped() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).expect("date");
        assert_eq!(days_rest(None, d(10)), 7.0);
        assert_eq!(days_rest(Some(d(9)), d(10)), 1.0);
        assert_eq!(days_rest(Some(d(1)), d(30)), 10.0);
        assert_eq!(days_rest(Some(d(10)), d(10)), 0.0);
    }
}
