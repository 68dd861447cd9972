use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::error::{IngestResult, StoreContext};
use crate::features::TrainingRow;
use crate::records::{GameRecord, PlayerEnrichment, PlayerGameStatRecord, PlayerRecord, TeamRecord};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn default_db_path() -> PathBuf {
    PathBuf::from("hoops_points.sqlite")
}

pub fn open_db(path: &Path) -> IngestResult<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).ok();
    }
    let conn = Connection::open(path).store_ctx("open sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> IngestResult<Connection> {
    let conn = Connection::open_in_memory().store_ctx("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> IngestResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS teams (
            id INTEGER PRIMARY KEY,
            full_name TEXT NOT NULL,
            abbreviation TEXT NOT NULL,
            nickname TEXT NOT NULL,
            city TEXT NOT NULL,
            state TEXT NOT NULL,
            year_founded INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS players (
            id INTEGER PRIMARY KEY,
            full_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            position TEXT NULL,
            height_inches INTEGER NULL,
            weight_lbs INTEGER NULL,
            age INTEGER NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS games (
            season_id TEXT NOT NULL,
            team_id INTEGER NOT NULL,
            team_abbreviation TEXT NOT NULL,
            game_id TEXT NOT NULL,
            game_date TEXT NOT NULL,
            matchup TEXT NOT NULL,
            opponent_team_id INTEGER NULL,
            is_home INTEGER NULL,
            win_loss TEXT NULL,
            minutes INTEGER NULL,
            points INTEGER NULL,
            fgm INTEGER NULL,
            fga INTEGER NULL,
            fg_pct REAL NULL,
            fg3m INTEGER NULL,
            fg3a INTEGER NULL,
            fg3_pct REAL NULL,
            ftm INTEGER NULL,
            fta INTEGER NULL,
            ft_pct REAL NULL,
            oreb INTEGER NULL,
            dreb INTEGER NULL,
            reb INTEGER NULL,
            ast INTEGER NULL,
            stl INTEGER NULL,
            blk INTEGER NULL,
            tov INTEGER NULL,
            pf INTEGER NULL,
            plus_minus REAL NULL,
            PRIMARY KEY (game_id, team_id)
        );
        CREATE INDEX IF NOT EXISTS idx_games_season ON games(season_id);
        CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date);

        CREATE TABLE IF NOT EXISTS player_game_stats (
            player_id INTEGER NOT NULL,
            game_id TEXT NOT NULL,
            team_id INTEGER NOT NULL,
            minutes REAL NOT NULL,
            points REAL NOT NULL,
            rebounds REAL NOT NULL,
            oreb REAL NOT NULL,
            dreb REAL NOT NULL,
            assists REAL NOT NULL,
            steals REAL NOT NULL,
            blocks REAL NOT NULL,
            turnovers REAL NOT NULL,
            fgm REAL NOT NULL,
            fga REAL NOT NULL,
            fg_pct REAL NOT NULL,
            fg3m REAL NOT NULL,
            fg3a REAL NOT NULL,
            fg3_pct REAL NOT NULL,
            ftm REAL NOT NULL,
            fta REAL NOT NULL,
            ft_pct REAL NOT NULL,
            starter INTEGER NOT NULL,
            PRIMARY KEY (player_id, game_id)
        );
        CREATE INDEX IF NOT EXISTS idx_pgs_game ON player_game_stats(game_id);

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            stage TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            units_total INTEGER NOT NULL DEFAULT 0,
            units_succeeded INTEGER NOT NULL DEFAULT 0,
            units_skipped INTEGER NOT NULL DEFAULT 0,
            rows_written INTEGER NOT NULL DEFAULT 0,
            errors_json TEXT NOT NULL DEFAULT '[]'
        );
        "#,
    )
    .store_ctx("create sqlite schema")?;
    Ok(())
}

/// Reference data: the first write wins.
pub fn upsert_team(conn: &Connection, team: &TeamRecord) -> IngestResult<usize> {
    conn.execute(
        r#"
        INSERT INTO teams (id, full_name, abbreviation, nickname, city, state, year_founded)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO NOTHING
        "#,
        params![
            team.id,
            team.full_name,
            team.abbreviation,
            team.nickname,
            team.city,
            team.state,
            team.year_founded,
        ],
    )
    .store_ctx("upsert team")
}

/// Identity fields are always overwritten; enrichment is merged field by field
/// with what is stored so a missing value never erases a known one. Returns the
/// enrichment now persisted.
pub fn upsert_player(conn: &Connection, player: &PlayerRecord) -> IngestResult<PlayerEnrichment> {
    let stored = load_enrichment(conn, player.id)?.unwrap_or_default();
    let merged = PlayerEnrichment::merge(&stored, &player.enrichment);
    conn.execute(
        r#"
        INSERT INTO players (
            id, full_name, first_name, last_name, is_active,
            position, height_inches, weight_lbs, age, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            full_name = excluded.full_name,
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            is_active = excluded.is_active,
            position = excluded.position,
            height_inches = excluded.height_inches,
            weight_lbs = excluded.weight_lbs,
            age = excluded.age,
            updated_at = excluded.updated_at
        "#,
        params![
            player.id,
            player.full_name,
            player.first_name,
            player.last_name,
            bool_to_i64(player.is_active),
            merged.position,
            merged.height_inches,
            merged.weight_lbs,
            merged.age,
            Utc::now().to_rfc3339(),
        ],
    )
    .store_ctx("upsert player")?;
    Ok(merged)
}

/// Historical fact: the first write wins. Returns 0 when the row already existed.
pub fn insert_game(conn: &Connection, g: &GameRecord) -> IngestResult<usize> {
    conn.execute(
        r#"
        INSERT INTO games (
            season_id, team_id, team_abbreviation, game_id, game_date,
            matchup, opponent_team_id, is_home,
            win_loss, minutes, points, fgm,
            fga, fg_pct, fg3m, fg3a, fg3_pct,
            ftm, fta, ft_pct, oreb, dreb,
            reb, ast, stl, blk, tov,
            pf, plus_minus
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8,
            ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16, ?17,
            ?18, ?19, ?20, ?21, ?22,
            ?23, ?24, ?25, ?26, ?27,
            ?28, ?29
        )
        ON CONFLICT(game_id, team_id) DO NOTHING
        "#,
        params![
            g.season_id,
            g.team_id,
            g.team_abbreviation,
            g.game_id,
            g.game_date.format(DATE_FORMAT).to_string(),
            g.matchup,
            g.opponent_team_id,
            g.is_home.map(bool_to_i64),
            g.win_loss,
            g.minutes,
            g.points,
            g.fgm,
            g.fga,
            g.fg_pct,
            g.fg3m,
            g.fg3a,
            g.fg3_pct,
            g.ftm,
            g.fta,
            g.ft_pct,
            g.oreb,
            g.dreb,
            g.reb,
            g.ast,
            g.stl,
            g.blk,
            g.tov,
            g.pf,
            g.plus_minus,
        ],
    )
    .store_ctx("insert game")
}

pub fn insert_player_game_stat(conn: &Connection, s: &PlayerGameStatRecord) -> IngestResult<usize> {
    conn.execute(
        r#"
        INSERT INTO player_game_stats (
            player_id, game_id, team_id, minutes, points,
            rebounds, oreb, dreb, assists, steals, blocks, turnovers,
            fgm, fga, fg_pct, fg3m, fg3a, fg3_pct,
            ftm, fta, ft_pct, starter
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16, ?17, ?18,
            ?19, ?20, ?21, ?22
        )
        ON CONFLICT(player_id, game_id) DO NOTHING
        "#,
        params![
            s.player_id,
            s.game_id,
            s.team_id,
            s.minutes,
            s.points,
            s.rebounds,
            s.oreb,
            s.dreb,
            s.assists,
            s.steals,
            s.blocks,
            s.turnovers,
            s.fgm,
            s.fga,
            s.fg_pct,
            s.fg3m,
            s.fg3a,
            s.fg3_pct,
            s.ftm,
            s.fta,
            s.ft_pct,
            bool_to_i64(s.starter),
        ],
    )
    .store_ctx("insert player game stat")
}

pub fn load_enrichment(conn: &Connection, player_id: i64) -> IngestResult<Option<PlayerEnrichment>> {
    conn.query_row(
        "SELECT position, height_inches, weight_lbs, age FROM players WHERE id = ?1",
        params![player_id],
        |row| {
            Ok(PlayerEnrichment {
                position: row.get(0)?,
                height_inches: row.get(1)?,
                weight_lbs: row.get(2)?,
                age: row.get(3)?,
            })
        },
    )
    .optional()
    .store_ctx("load player enrichment")
}

pub fn load_player(conn: &Connection, player_id: i64) -> IngestResult<Option<PlayerRecord>> {
    conn.query_row(
        r#"
        SELECT id, full_name, first_name, last_name, is_active,
               position, height_inches, weight_lbs, age
        FROM players WHERE id = ?1
        "#,
        params![player_id],
        |row| {
            Ok(PlayerRecord {
                id: row.get(0)?,
                full_name: row.get(1)?,
                first_name: row.get(2)?,
                last_name: row.get(3)?,
                is_active: row.get::<_, i64>(4)? != 0,
                enrichment: PlayerEnrichment {
                    position: row.get(5)?,
                    height_inches: row.get(6)?,
                    weight_lbs: row.get(7)?,
                    age: row.get(8)?,
                },
            })
        },
    )
    .optional()
    .store_ctx("load player")
}

/// Stored enrichment of every known player, keyed by id.
pub fn player_enrichment_map(conn: &Connection) -> IngestResult<HashMap<i64, PlayerEnrichment>> {
    let mut stmt = conn
        .prepare("SELECT id, position, height_inches, weight_lbs, age FROM players")
        .store_ctx("prepare player enrichment query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                PlayerEnrichment {
                    position: row.get(1)?,
                    height_inches: row.get(2)?,
                    weight_lbs: row.get(3)?,
                    age: row.get(4)?,
                },
            ))
        })
        .store_ctx("query player enrichment")?;

    let mut out = HashMap::new();
    for row in rows {
        let (id, enrichment) = row.store_ctx("decode player enrichment row")?;
        out.insert(id, enrichment);
    }
    Ok(out)
}

pub fn player_ids(conn: &Connection) -> IngestResult<HashSet<i64>> {
    let mut stmt = conn
        .prepare("SELECT id FROM players")
        .store_ctx("prepare player ids query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, i64>(0))
        .store_ctx("query player ids")?;
    let mut out = HashSet::new();
    for row in rows {
        out.insert(row.store_ctx("decode player id")?);
    }
    Ok(out)
}

/// Events with at least one persisted stat row.
pub fn processed_game_ids(conn: &Connection) -> IngestResult<HashSet<String>> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT game_id FROM player_game_stats")
        .store_ctx("prepare processed games query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .store_ctx("query processed games")?;
    let mut out = HashSet::new();
    for row in rows {
        out.insert(row.store_ctx("decode processed game id")?);
    }
    Ok(out)
}

/// Distinct event ids of the given seasons, oldest first.
pub fn game_ids_for_seasons(conn: &Connection, season_ids: &[String]) -> IngestResult<Vec<String>> {
    if season_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; season_ids.len()].join(", ");
    let sql = format!(
        "SELECT game_id, MIN(game_date) AS first_date
         FROM games
         WHERE season_id IN ({placeholders})
         GROUP BY game_id
         ORDER BY first_date ASC, game_id ASC"
    );
    let mut stmt = conn.prepare(&sql).store_ctx("prepare season games query")?;
    let rows = stmt
        .query_map(params_from_iter(season_ids.iter()), |row| {
            row.get::<_, String>(0)
        })
        .store_ctx("query season games")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.store_ctx("decode season game id")?);
    }
    Ok(out)
}

/// Events not made of exactly two team rows with complementary home flags.
pub fn unpaired_game_ids(conn: &Connection) -> IngestResult<Vec<String>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT game_id
            FROM games
            GROUP BY game_id
            HAVING COUNT(*) != 2
                OR COUNT(DISTINCT team_id) != 2
                OR COUNT(is_home) != 2
                OR SUM(is_home) != 1
            ORDER BY game_id
            "#,
        )
        .store_ctx("prepare unpaired games query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .store_ctx("query unpaired games")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.store_ctx("decode unpaired game id")?);
    }
    Ok(out)
}

/// One row per player appearance with positive minutes, joined to the team's
/// game row and the opponent's game row of the same event.
pub fn load_training_rows(conn: &Connection) -> IngestResult<Vec<TrainingRow>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                pgs.player_id,
                pgs.game_id,
                pgs.team_id,
                pgs.minutes,
                pgs.points,
                g.game_date,
                opp.team_id,
                opp.points
            FROM player_game_stats pgs
            JOIN games g ON pgs.game_id = g.game_id AND pgs.team_id = g.team_id
            JOIN games opp ON opp.game_id = g.game_id AND opp.team_id != g.team_id
            WHERE pgs.minutes > 0
            ORDER BY pgs.player_id, g.game_date, pgs.game_id
            "#,
        )
        .store_ctx("prepare training rows query")?;
    let rows = stmt
        .query_map([], |row| {
            let raw_date: String = row.get(5)?;
            let game_date = NaiveDate::parse_from_str(&raw_date, DATE_FORMAT).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(err))
            })?;
            Ok(TrainingRow {
                player_id: row.get(0)?,
                game_id: row.get(1)?,
                team_id: row.get(2)?,
                minutes: row.get(3)?,
                player_points: row.get(4)?,
                game_date,
                opponent_team_id: row.get(6)?,
                points_allowed: row.get::<_, Option<f64>>(7)?,
            })
        })
        .store_ctx("query training rows")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.store_ctx("decode training row")?);
    }
    Ok(out)
}

pub fn table_count(conn: &Connection, table: &str) -> IngestResult<i64> {
    let sql = match table {
        "teams" => "SELECT COUNT(*) FROM teams",
        "players" => "SELECT COUNT(*) FROM players",
        "games" => "SELECT COUNT(*) FROM games",
        "player_game_stats" => "SELECT COUNT(*) FROM player_game_stats",
        "ingest_runs" => "SELECT COUNT(*) FROM ingest_runs",
        _ => return Ok(0),
    };
    conn.query_row(sql, [], |row| row.get(0))
        .store_ctx("count table rows")
}

pub fn begin_ingest_run(conn: &Connection, stage: &str) -> IngestResult<i64> {
    conn.execute(
        "INSERT INTO ingest_runs(stage, started_at) VALUES (?1, ?2)",
        params![stage, Utc::now().to_rfc3339()],
    )
    .store_ctx("insert ingest run")?;
    Ok(conn.last_insert_rowid())
}

pub struct RunTotals<'a> {
    pub units_total: usize,
    pub units_succeeded: usize,
    pub units_skipped: usize,
    pub rows_written: usize,
    pub errors: &'a [String],
}

pub fn finish_ingest_run(conn: &Connection, run_id: i64, totals: RunTotals<'_>) -> IngestResult<()> {
    let errors_json = serde_json::to_string(totals.errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        r#"
        UPDATE ingest_runs
        SET finished_at = ?1, units_total = ?2, units_succeeded = ?3,
            units_skipped = ?4, rows_written = ?5, errors_json = ?6
        WHERE run_id = ?7
        "#,
        params![
            Utc::now().to_rfc3339(),
            totals.units_total as i64,
            totals.units_succeeded as i64,
            totals.units_skipped as i64,
            totals.rows_written as i64,
            errors_json,
            run_id,
        ],
    )
    .store_ctx("update ingest run")?;
    Ok(())
}

fn bool_to_i64(v: bool) -> i64 {
    if v { 1 } else { 0 }
}
