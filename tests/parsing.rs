use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;

use hoops_points::records::{
    GameRecord, PlayerEnrichment, PlayerGameStatRecord, PlayerRecord, parse_matchup,
};
use hoops_points::stats_source::parse_primary_result_set;
use hoops_points::teams::team_id_for_abbreviation;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[test]
fn parses_game_finder_fixture() {
    let raw = read_fixture("leaguegamefinder.json");
    let table = parse_primary_result_set(&raw)
        .expect("fixture should parse")
        .expect("has result set");
    assert_eq!(table.name, "LeagueGameFinderResults");
    assert_eq!(table.len(), 5);

    let games = table
        .iter()
        .map(|row| GameRecord::from_finder_row(&row, team_id_for_abbreviation))
        .collect::<Result<Vec<_>, _>>()
        .expect("rows should parse");

    let lal = &games[0];
    assert_eq!(lal.season_id, "22023");
    assert_eq!(lal.game_date, NaiveDate::from_ymd_opt(2023, 10, 24).expect("date"));
    assert_eq!(lal.is_home, Some(false));
    assert_eq!(lal.opponent_team_id, Some(1610612743));
    assert_eq!(lal.points, Some(107));
    assert_eq!(lal.fg_pct, Some(0.456));

    let den = &games[1];
    assert_eq!(den.is_home, Some(true));
    assert_eq!(den.opponent_team_id, Some(1610612747));

    // all-star exhibition teams are not franchises
    let exhibition = &games[4];
    assert_eq!(team_id_for_abbreviation(&exhibition.team_abbreviation), None);
    assert_eq!(exhibition.opponent_team_id, None);
}

#[test]
fn parses_box_score_fixture() {
    let raw = read_fixture("boxscoretraditionalv2.json");
    let table = parse_primary_result_set(&raw)
        .expect("fixture should parse")
        .expect("has result set");
    assert_eq!(table.name, "PlayerStats");

    let stats = table
        .iter()
        .map(|row| PlayerGameStatRecord::from_box_score_row(&row))
        .collect::<Result<Vec<_>, _>>()
        .expect("rows should parse");
    assert_eq!(stats.len(), 5);

    let lebron = &stats[0];
    assert_eq!(lebron.player_id, 2544);
    assert_eq!(lebron.minutes, 29.0);
    assert_eq!(lebron.points, 21.0);
    assert!(lebron.starter);

    let reaves = &stats[2];
    assert_eq!(reaves.minutes, 31.2);
    assert!(!reaves.starter);

    let dnp = &stats[3];
    assert_eq!(dnp.minutes, 0.0);
    assert_eq!(dnp.points, 0.0);
    assert_eq!(dnp.turnovers, 0.0);
    assert!(!dnp.starter);
}

#[test]
fn parses_player_info_fixture() {
    let raw = read_fixture("commonplayerinfo.json");
    let table = parse_primary_result_set(&raw)
        .expect("fixture should parse")
        .expect("has result set");
    let row = table.row(0).expect("one row");
    let today = NaiveDate::from_ymd_opt(2024, 1, 15).expect("date");
    let enrichment = PlayerEnrichment::from_player_info(&row, today);
    assert_eq!(enrichment.position.as_deref(), Some("Forward"));
    assert_eq!(enrichment.height_inches, Some(81));
    assert_eq!(enrichment.weight_lbs, Some(250));
    assert_eq!(enrichment.age, Some(39));
    assert!(enrichment.is_complete());
}

#[test]
fn parses_reference_player_fixture() {
    let raw = read_fixture("commonallplayers.json");
    let table = parse_primary_result_set(&raw)
        .expect("fixture should parse")
        .expect("has result set");
    let players = table
        .iter()
        .map(|row| PlayerRecord::from_reference_row(&row))
        .collect::<Result<Vec<_>, _>>()
        .expect("rows should parse");
    assert_eq!(players.len(), 3);
    assert_eq!(players[2].full_name, "Nikola Jokic");
    assert_eq!(players[2].first_name, "Nikola");
    assert_eq!(players[2].last_name, "Jokic");
    assert!(players.iter().all(|p| p.is_active));
    assert!(players.iter().all(|p| !p.enrichment.is_complete()));
}

#[test]
fn matchup_strings() {
    assert_eq!(parse_matchup("LAL vs. GSW"), (Some(true), Some("GSW".to_string())));
    assert_eq!(parse_matchup("LAL @ GSW"), (Some(false), Some("GSW".to_string())));
    assert_eq!(parse_matchup("LAL"), (None, None));
    assert_eq!(parse_matchup(""), (None, None));
    assert_eq!(parse_matchup("LAL v GSW"), (None, Some("GSW".to_string())));
}
