use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::stats_source::TableRow;

pub const DEFAULT_SEASON: &str = "2023-24";
const DEFAULT_SEASON_ID: i64 = 22023;

#[derive(Debug, Clone, PartialEq)]
pub struct TeamRecord {
    pub id: i64,
    pub full_name: String,
    pub abbreviation: String,
    pub nickname: String,
    pub city: String,
    pub state: String,
    pub year_founded: i32,
}

/// Biographical fields filled in progressively by player-info lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerEnrichment {
    pub position: Option<String>,
    pub height_inches: Option<i64>,
    pub weight_lbs: Option<i64>,
    pub age: Option<i64>,
}

impl PlayerEnrichment {
    pub fn is_complete(&self) -> bool {
        self.position.is_some()
            && self.height_inches.is_some()
            && self.weight_lbs.is_some()
            && self.age.is_some()
    }

    /// Field-wise merge: a supplied value replaces the stored one, a missing
    /// value never erases it.
    pub fn merge(stored: &PlayerEnrichment, incoming: &PlayerEnrichment) -> PlayerEnrichment {
        PlayerEnrichment {
            position: incoming.position.clone().or_else(|| stored.position.clone()),
            height_inches: incoming.height_inches.or(stored.height_inches),
            weight_lbs: incoming.weight_lbs.or(stored.weight_lbs),
            age: incoming.age.or(stored.age),
        }
    }

    /// Reads a `CommonPlayerInfo` row.
    pub fn from_player_info(row: &TableRow<'_>, today: NaiveDate) -> Self {
        let position = row
            .opt_str("POSITION")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self {
            position,
            height_inches: row.opt_str("HEIGHT").as_deref().and_then(parse_height_to_inches),
            weight_lbs: row.opt_str("WEIGHT").as_deref().and_then(parse_int_safe),
            age: row
                .opt_str("BIRTHDATE")
                .as_deref()
                .and_then(|raw| age_on(raw, today)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: i64,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub enrichment: PlayerEnrichment,
}

impl PlayerRecord {
    /// Reads a `CommonAllPlayers` row (`PERSON_ID`, `DISPLAY_FIRST_LAST`,
    /// `DISPLAY_LAST_COMMA_FIRST`, `ROSTERSTATUS`).
    pub fn from_reference_row(row: &TableRow<'_>) -> Result<Self, String> {
        let id = row.require_i64("PERSON_ID")?;
        let full_name = row.require_str("DISPLAY_FIRST_LAST")?;
        let (first_name, last_name) = row
            .opt_str("DISPLAY_LAST_COMMA_FIRST")
            .as_deref()
            .and_then(split_last_comma_first)
            .unwrap_or_else(|| split_full_name(&full_name));
        let is_active = row
            .opt_i64("ROSTERSTATUS")
            .map(|v| v != 0)
            .unwrap_or(true);
        Ok(Self {
            id,
            full_name,
            first_name,
            last_name,
            is_active,
            enrichment: PlayerEnrichment::default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub season_id: String,
    pub team_id: i64,
    pub team_abbreviation: String,
    pub game_id: String,
    pub game_date: NaiveDate,
    pub matchup: String,
    pub is_home: Option<bool>,
    pub opponent_team_id: Option<i64>,
    pub win_loss: Option<String>,
    pub minutes: Option<i64>,
    pub points: Option<i64>,
    pub fgm: Option<i64>,
    pub fga: Option<i64>,
    pub fg_pct: Option<f64>,
    pub fg3m: Option<i64>,
    pub fg3a: Option<i64>,
    pub fg3_pct: Option<f64>,
    pub ftm: Option<i64>,
    pub fta: Option<i64>,
    pub ft_pct: Option<f64>,
    pub oreb: Option<i64>,
    pub dreb: Option<i64>,
    pub reb: Option<i64>,
    pub ast: Option<i64>,
    pub stl: Option<i64>,
    pub blk: Option<i64>,
    pub tov: Option<i64>,
    pub pf: Option<i64>,
    pub plus_minus: Option<f64>,
}

impl GameRecord {
    /// Reads a `LeagueGameFinderResults` row. The opponent is resolved by the
    /// caller from the matchup abbreviation.
    pub fn from_finder_row(
        row: &TableRow<'_>,
        resolve_abbreviation: impl Fn(&str) -> Option<i64>,
    ) -> Result<Self, String> {
        let matchup = row.require_str("MATCHUP")?;
        let (is_home, opponent_abbr) = parse_matchup(&matchup);
        let raw_date = row.require_str("GAME_DATE")?;
        let game_date = parse_game_date(&raw_date)
            .ok_or_else(|| format!("unparseable GAME_DATE {raw_date}"))?;
        Ok(Self {
            season_id: row.require_str("SEASON_ID")?,
            team_id: row.require_i64("TEAM_ID")?,
            team_abbreviation: row.opt_str("TEAM_ABBREVIATION").unwrap_or_default(),
            game_id: row.require_str("GAME_ID")?,
            game_date,
            opponent_team_id: opponent_abbr.as_deref().and_then(resolve_abbreviation),
            is_home,
            matchup,
            win_loss: row.opt_str("WL"),
            minutes: row.opt_i64("MIN"),
            points: row.opt_i64("PTS"),
            fgm: row.opt_i64("FGM"),
            fga: row.opt_i64("FGA"),
            fg_pct: row.opt_f64("FG_PCT"),
            fg3m: row.opt_i64("FG3M"),
            fg3a: row.opt_i64("FG3A"),
            fg3_pct: row.opt_f64("FG3_PCT"),
            ftm: row.opt_i64("FTM"),
            fta: row.opt_i64("FTA"),
            ft_pct: row.opt_f64("FT_PCT"),
            oreb: row.opt_i64("OREB"),
            dreb: row.opt_i64("DREB"),
            reb: row.opt_i64("REB"),
            ast: row.opt_i64("AST"),
            stl: row.opt_i64("STL"),
            blk: row.opt_i64("BLK"),
            tov: row.opt_i64("TOV"),
            pf: row.opt_i64("PF"),
            plus_minus: row.opt_f64("PLUS_MINUS"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerGameStatRecord {
    pub player_id: i64,
    pub game_id: String,
    pub team_id: i64,
    pub minutes: f64,
    pub points: f64,
    pub rebounds: f64,
    pub oreb: f64,
    pub dreb: f64,
    pub assists: f64,
    pub steals: f64,
    pub blocks: f64,
    pub turnovers: f64,
    pub fgm: f64,
    pub fga: f64,
    pub fg_pct: f64,
    pub fg3m: f64,
    pub fg3a: f64,
    pub fg3_pct: f64,
    pub ftm: f64,
    pub fta: f64,
    pub ft_pct: f64,
    pub starter: bool,
}

impl PlayerGameStatRecord {
    /// Reads a box score `PlayerStats` row. Absent numeric stats read as zero.
    pub fn from_box_score_row(row: &TableRow<'_>) -> Result<Self, String> {
        let stat = |column: &str| row.opt_f64(column).unwrap_or(0.0);
        let starter = row
            .opt_str("START_POSITION")
            .is_some_and(|s| !s.trim().is_empty());
        Ok(Self {
            player_id: row.require_i64("PLAYER_ID")?,
            game_id: row.require_str("GAME_ID")?,
            team_id: row.require_i64("TEAM_ID")?,
            minutes: convert_time_to_minutes(row.opt_str("MIN").as_deref()),
            points: stat("PTS"),
            rebounds: stat("REB"),
            oreb: stat("OREB"),
            dreb: stat("DREB"),
            assists: stat("AST"),
            steals: stat("STL"),
            blocks: stat("BLK"),
            turnovers: stat("TO"),
            fgm: stat("FGM"),
            fga: stat("FGA"),
            fg_pct: stat("FG_PCT"),
            fg3m: stat("FG3M"),
            fg3a: stat("FG3A"),
            fg3_pct: stat("FG3_PCT"),
            ftm: stat("FTM"),
            fta: stat("FTA"),
            ft_pct: stat("FT_PCT"),
            starter,
        })
    }
}

/// "M:SS" court time to fractional minutes. The minutes part may carry a
/// decimal ("34.000000:12", as some box scores send it). Anything without a
/// colon, including a bare number, is zero.
pub fn convert_time_to_minutes(raw: Option<&str>) -> f64 {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return 0.0;
    };
    raw.split_once(':')
        .and_then(|(minutes, seconds)| {
            let m = minutes.trim().parse::<f64>().ok()?;
            let s = seconds.trim().parse::<f64>().ok()?;
            Some(m + s / 60.0)
        })
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// "LAL vs. GSW" is a home game against GSW, "LAL @ GSW" an away one.
/// Anything shorter than three tokens yields `(None, None)`.
pub fn parse_matchup(matchup: &str) -> (Option<bool>, Option<String>) {
    let parts = matchup.split_whitespace().collect::<Vec<_>>();
    if parts.len() < 3 {
        return (None, None);
    }
    let is_home = match parts[1] {
        "vs." => Some(true),
        "@" => Some(false),
        _ => None,
    };
    (is_home, Some(parts[2].to_string()))
}

pub fn parse_height_to_inches(raw: &str) -> Option<i64> {
    let (feet, inches) = raw.trim().split_once('-')?;
    let feet = feet.trim().parse::<i64>().ok()?;
    let inches = inches.trim().parse::<i64>().ok()?;
    Some(feet * 12 + inches)
}

pub fn parse_int_safe(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok()
}

/// Whole years between an ISO birthdate ("1984-12-30T00:00:00") and `today`.
pub fn age_on(birthdate: &str, today: NaiveDate) -> Option<i64> {
    let born = parse_game_date(birthdate)?;
    let mut age = i64::from(today.year() - born.year());
    if (today.month(), today.day()) < (born.month(), born.day()) {
        age -= 1;
    }
    (age >= 0).then_some(age)
}

/// Accepts "2023-10-24", "2023-10-24T00:00:00" and a trailing "Z".
pub fn parse_game_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim().trim_end_matches('Z');
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    let date_part = trimmed.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// "2023-24" -> 22023, the regular-season id the game finder reports.
pub fn season_to_season_id(season: &str) -> i64 {
    season
        .get(..4)
        .and_then(|y| y.parse::<i64>().ok())
        .map(|start_year| 22000 + start_year - 2000)
        .unwrap_or(DEFAULT_SEASON_ID)
}

pub fn is_valid_season(season: &str) -> bool {
    let bytes = season.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit)
}

/// Comma separated `YYYY-YY` list; malformed items are skipped, an empty
/// result falls back to the default season.
pub fn parse_seasons(raw: Option<&str>) -> Vec<String> {
    let mut out = Vec::new();
    for item in raw.unwrap_or_default().split(',') {
        let season = item.trim();
        if is_valid_season(season) && !out.iter().any(|s| s == season) {
            out.push(season.to_string());
        }
    }
    if out.is_empty() {
        out.push(DEFAULT_SEASON.to_string());
    }
    out
}

fn split_last_comma_first(raw: &str) -> Option<(String, String)> {
    let (last, first) = raw.split_once(',')?;
    Some((first.trim().to_string(), last.trim().to_string()))
}

fn split_full_name(full_name: &str) -> (String, String) {
    match full_name.trim().split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (full_name.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::stats_source::ResultTable;

    #[test]
    fn converts_court_time() {
        assert_eq!(convert_time_to_minutes(Some("0:00")), 0.0);
        assert_eq!(convert_time_to_minutes(Some("1:30")), 1.5);
        assert_eq!(convert_time_to_minutes(Some("36:45")), 36.75);
        assert_eq!(convert_time_to_minutes(Some("34.000000:12")), 34.2);
        assert_eq!(convert_time_to_minutes(Some("28")), 0.0);
        assert_eq!(convert_time_to_minutes(Some("34.000000")), 0.0);
        assert_eq!(convert_time_to_minutes(Some("")), 0.0);
        assert_eq!(convert_time_to_minutes(None), 0.0);
        assert_eq!(convert_time_to_minutes(Some("invalid")), 0.0);
        assert_eq!(convert_time_to_minutes(Some("1:xx")), 0.0);
    }

    #[test]
    fn heights_and_ages() {
        assert_eq!(parse_height_to_inches("6-9"), Some(81));
        assert_eq!(parse_height_to_inches("7-0"), Some(84));
        assert_eq!(parse_height_to_inches("6'9\""), None);
        assert_eq!(parse_height_to_inches(""), None);

        let today = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
        assert_eq!(age_on("1984-12-30T00:00:00", today), Some(39));
        assert_eq!(age_on("1988-03-01", today), Some(36));
        assert_eq!(age_on("1988-03-02", today), Some(35));
        assert_eq!(age_on("unknown", today), None);
    }

    #[test]
    fn season_ids_and_lists() {
        assert_eq!(season_to_season_id("2023-24"), 22023);
        assert_eq!(season_to_season_id("2019-20"), 22019);
        assert_eq!(season_to_season_id("bad"), 22023);
        assert_eq!(
            parse_seasons(Some("2021-22, 2022-23,bogus,2022-23")),
            vec!["2021-22".to_string(), "2022-23".to_string()]
        );
        assert_eq!(parse_seasons(None), vec!["2023-24".to_string()]);
        assert_eq!(parse_seasons(Some("2023")), vec!["2023-24".to_string()]);
    }

    #[test]
    fn enrichment_merge_is_field_level() {
        let stored = PlayerEnrichment {
            position: Some("Forward".to_string()),
            height_inches: None,
            weight_lbs: Some(250),
            age: Some(39),
        };
        let incoming = PlayerEnrichment {
            position: None,
            height_inches: Some(81),
            weight_lbs: None,
            age: Some(40),
        };
        let merged = PlayerEnrichment::merge(&stored, &incoming);
        assert_eq!(merged.position.as_deref(), Some("Forward"));
        assert_eq!(merged.height_inches, Some(81));
        assert_eq!(merged.weight_lbs, Some(250));
        assert_eq!(merged.age, Some(40));
        assert!(merged.is_complete());
        assert!(!stored.is_complete());
    }

    #[test]
    fn reads_box_score_row_with_defaults() {
        let table = ResultTable::new(
            "PlayerStats",
            &["GAME_ID", "TEAM_ID", "PLAYER_ID", "START_POSITION", "MIN", "PTS", "REB", "TO"],
            vec![
                vec![
                    json!("0022300061"),
                    json!(1610612747),
                    json!(2544),
                    json!("F"),
                    json!("35:30"),
                    json!(21),
                    json!(null),
                    json!(3),
                ],
                vec![
                    json!("0022300061"),
                    json!(1610612747),
                    json!(1630559),
                    json!(""),
                    json!(null),
                    json!(null),
                    json!(null),
                    json!(null),
                ],
            ],
        );
        let starter =
            PlayerGameStatRecord::from_box_score_row(&table.row(0).expect("row")).expect("valid");
        assert!(starter.starter);
        assert_eq!(starter.minutes, 35.5);
        assert_eq!(starter.points, 21.0);
        assert_eq!(starter.rebounds, 0.0);
        assert_eq!(starter.turnovers, 3.0);

        let bench =
            PlayerGameStatRecord::from_box_score_row(&table.row(1).expect("row")).expect("valid");
        assert!(!bench.starter);
        assert_eq!(bench.minutes, 0.0);
        assert_eq!(bench.points, 0.0);
    }

    #[test]
    fn reads_reference_player_row() {
        let table = ResultTable::new(
            "CommonAllPlayers",
            &["PERSON_ID", "DISPLAY_LAST_COMMA_FIRST", "DISPLAY_FIRST_LAST", "ROSTERSTATUS"],
            vec![
                vec![json!(2544), json!("James, LeBron"), json!("LeBron James"), json!(1)],
                vec![json!(1), json!(null), json!("Nene"), json!(0)],
            ],
        );
        let lebron = PlayerRecord::from_reference_row(&table.row(0).expect("row")).expect("ok");
        assert_eq!(lebron.first_name, "LeBron");
        assert_eq!(lebron.last_name, "James");
        assert!(lebron.is_active);
        let nene = PlayerRecord::from_reference_row(&table.row(1).expect("row")).expect("ok");
        assert_eq!(nene.first_name, "Nene");
        assert_eq!(nene.last_name, "");
        assert!(!nene.is_active);
    }
}
