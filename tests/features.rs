use chrono::NaiveDate;

use hoops_points::features::{FEATURE_COUNT, FeatureRow, TrainingRow, build_features};
use hoops_points::training::TrainingSet;

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, month, day).expect("valid date")
}

fn row(player_id: i64, game_id: &str, day: u32, points: f64, opponent: i64, allowed: f64) -> TrainingRow {
    TrainingRow {
        player_id,
        game_id: game_id.to_string(),
        team_id: 1,
        minutes: 30.0,
        player_points: points,
        game_date: date(11, day),
        opponent_team_id: opponent,
        points_allowed: Some(allowed),
    }
}

fn rolling_part(r: &FeatureRow) -> [Option<f64>; 8] {
    [
        r.player_points_last_5,
        r.player_points_last_10,
        r.player_points_ewm_span_5,
        r.player_points_ewm_span_10,
        r.ppm_last_5,
        r.ppm_last_10,
        r.ppm_ewm_span_5,
        r.ppm_ewm_span_10,
    ]
}

#[test]
fn two_events_use_prior_data_only() {
    let frame = build_features(vec![
        row(7, "G2", 3, 20.0, 100, 110.0),
        row(7, "G1", 1, 10.0, 100, 105.0),
    ]);
    assert_eq!(frame.len(), 2);
    let first = &frame.rows[0];
    let second = &frame.rows[1];
    assert_eq!(first.game_id, "G1");
    assert_eq!(first.player_points_last_10, None);
    assert_eq!(first.player_points_ewm_span_5, None);
    assert_eq!(second.player_points_last_10, Some(10.0));
    assert_eq!(second.player_points_last_5, Some(10.0));
    assert_eq!(second.player_points_ewm_span_10, Some(10.0));
    assert_eq!(first.days_rest, 7.0);
    assert_eq!(second.days_rest, 2.0);
}

#[test]
fn mutating_own_points_leaves_own_features_unchanged() {
    let base = (1..=12)
        .map(|d| row(7, &format!("G{d:02}"), d, f64::from(d) * 2.0, 100 + i64::from(d % 3), 100.0))
        .collect::<Vec<_>>();
    let original = build_features(base.clone());

    for n in 0..base.len() {
        let mut mutated = base.clone();
        mutated[n].player_points += 50.0;
        mutated[n].minutes += 5.0;
        let frame = build_features(mutated);
        assert_eq!(
            rolling_part(&frame.rows[n]),
            rolling_part(&original.rows[n]),
            "row {n} moved with its own outcome"
        );
        for earlier in 0..n {
            assert_eq!(rolling_part(&frame.rows[earlier]), rolling_part(&original.rows[earlier]));
        }
    }
}

#[test]
fn zero_minutes_yield_missing_rate() {
    let mut zero = row(7, "G1", 1, 0.0, 100, 100.0);
    zero.minutes = 0.0;
    let frame = build_features(vec![zero, row(7, "G2", 2, 12.0, 100, 100.0)]);
    assert_eq!(frame.rows[0].points_per_minute, None);
    assert_eq!(frame.rows[1].ppm_last_5, None);
    assert_eq!(frame.rows[1].player_points_last_5, Some(0.0));
}

#[test]
fn rest_days_are_clipped_to_ten() {
    let frame = build_features(vec![
        row(7, "G1", 1, 10.0, 100, 100.0),
        row(7, "G2", 1, 10.0, 100, 100.0),
        row(7, "G3", 25, 10.0, 100, 100.0),
    ]);
    let rest = frame.rows.iter().map(|r| r.days_rest).collect::<Vec<_>>();
    assert_eq!(rest, vec![7.0, 0.0, 10.0]);
}

#[test]
fn opponent_strength_is_trailing_then_falls_back() {
    // opponent 100 is faced three times, allowing 100, 110, 120
    let frame = build_features(vec![
        row(1, "G1", 1, 10.0, 100, 100.0),
        row(1, "G2", 2, 10.0, 100, 110.0),
        row(2, "G3", 3, 10.0, 100, 120.0),
        row(2, "G4", 4, 10.0, 200, 90.0),
    ]);
    let by_game = |id: &str| {
        frame
            .rows
            .iter()
            .find(|r| r.game_id == id)
            .and_then(|r| r.opponent_avg_points_allowed_last_10)
    };
    // first meeting has no history: all-time mean of opponent 100
    assert_eq!(by_game("G1"), Some(110.0));
    assert_eq!(by_game("G2"), Some(100.0));
    assert_eq!(by_game("G3"), Some(105.0));
    // opponent 200 only appears once: its own all-time mean
    assert_eq!(by_game("G4"), Some(90.0));
}

#[test]
fn opponent_without_history_uses_global_mean() {
    let mut unknown = row(3, "G9", 9, 10.0, 300, 0.0);
    unknown.points_allowed = None;
    let frame = build_features(vec![
        row(1, "G1", 1, 10.0, 100, 100.0),
        row(1, "G2", 2, 10.0, 200, 120.0),
        unknown,
    ]);
    let last = frame.rows.iter().find(|r| r.game_id == "G9").expect("row");
    assert_eq!(last.opponent_avg_points_allowed_last_10, Some(110.0));
}

#[test]
fn same_event_counts_once_per_opponent() {
    // two teammates facing opponent 100 in G1 must not see each other's event
    let frame = build_features(vec![
        row(1, "G1", 1, 10.0, 100, 100.0),
        row(2, "G1", 1, 12.0, 100, 100.0),
        row(1, "G2", 5, 10.0, 100, 130.0),
    ]);
    let g2 = frame.rows.iter().find(|r| r.game_id == "G2").expect("row");
    assert_eq!(g2.opponent_avg_points_allowed_last_10, Some(100.0));
}

#[test]
fn output_is_sorted_by_player_then_date() {
    let frame = build_features(vec![
        row(2, "G3", 3, 1.0, 100, 100.0),
        row(1, "G2", 2, 1.0, 100, 100.0),
        row(2, "G1", 1, 1.0, 100, 100.0),
        row(1, "G4", 1, 1.0, 100, 100.0),
    ]);
    let order = frame
        .rows
        .iter()
        .map(|r| (r.player_id, r.game_id.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(order, vec![(1, "G4"), (1, "G2"), (2, "G1"), (2, "G3")]);
}

#[test]
fn training_drops_rows_with_missing_features() {
    let frame = build_features(vec![
        row(7, "G1", 1, 10.0, 100, 100.0),
        row(7, "G2", 3, 20.0, 100, 110.0),
        row(7, "G3", 5, 30.0, 100, 120.0),
    ]);
    assert_eq!(frame.missing_counts()[0], 1);
    let set = TrainingSet::from_frame(&frame);
    assert_eq!(set.dropped, 1);
    assert_eq!(set.len(), 2);
    assert_eq!(set.samples[0].x.len(), FEATURE_COUNT);
    assert_eq!(set.samples[0].y, 20.0);
}

#[test]
fn opponent_strength_is_per_event_across_many_teammates() {
    // eight players share every event against opponent 100, which allows 100 + event
    let mut rows = Vec::new();
    for event in 1..=20u32 {
        for player in 1..=8i64 {
            rows.push(row(player, &format!("G{event:02}"), event, 10.0, 100, 100.0 + f64::from(event)));
        }
    }
    let frame = build_features(rows);
    assert_eq!(frame.len(), 160);
    for r in &frame.rows {
        let event = r.game_id[1..].parse::<u32>().expect("event number");
        let expected = if event == 1 {
            // no earlier event: all-time mean over 101..=120
            110.5
        } else {
            let first = event.saturating_sub(10).max(1);
            let window = (first..event).map(|e| 100.0 + f64::from(e)).collect::<Vec<_>>();
            window.iter().sum::<f64>() / window.len() as f64
        };
        assert_eq!(r.opponent_avg_points_allowed_last_10, Some(expected), "{}", r.game_id);
    }
}
