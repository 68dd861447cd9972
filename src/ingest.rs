use std::collections::HashSet;
use std::fmt;

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::error::{FetchError, IngestError, IngestResult, StoreContext};
use crate::executor::{RequestExecutor, Sleeper, ThreadSleeper};
use crate::records::{
    GameRecord, PlayerEnrichment, PlayerGameStatRecord, PlayerRecord, TeamRecord,
    season_to_season_id,
};
use crate::stats_source::StatsSource;
use crate::store::{self, RunTotals};
use crate::teams;

const MAX_REPORTED_ERRORS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Players,
    Teams,
    Games,
    PlayerGameStats,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Players => "players",
            Stage::Teams => "teams",
            Stage::Games => "games",
            Stage::PlayerGameStats => "player_game_stats",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub stage: Stage,
    pub units_total: usize,
    pub units_succeeded: usize,
    pub units_skipped: usize,
    pub rows_written: usize,
    pub errors: Vec<String>,
}

impl StageSummary {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            units_total: 0,
            units_succeeded: 0,
            units_skipped: 0,
            rows_written: 0,
            errors: Vec::new(),
        }
    }

    fn push_error(&mut self, message: String) {
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(message);
        }
    }

    pub fn units_failed(&self) -> usize {
        self.units_total
            .saturating_sub(self.units_succeeded + self.units_skipped)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub seasons: Vec<String>,
    pub stages: Vec<StageSummary>,
}

impl IngestSummary {
    pub fn stage(&self, stage: Stage) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

/// Owns the store connection, the data source and the run configuration for
/// the lifetime of one or more ingest runs.
pub struct IngestContext<S: StatsSource> {
    conn: Connection,
    source: S,
    config: IngestConfig,
    sleeper: Box<dyn Sleeper>,
    today: NaiveDate,
}

impl<S: StatsSource> IngestContext<S> {
    pub fn new(conn: Connection, source: S, config: IngestConfig, sleeper: Box<dyn Sleeper>) -> Self {
        Self {
            conn,
            source,
            config,
            sleeper,
            today: Utc::now().date_naive(),
        }
    }

    /// Opens (and migrates) the database named by `config.db_path`.
    pub fn open(source: S, config: IngestConfig) -> IngestResult<Self> {
        let conn = store::open_db(&config.db_path)?;
        Ok(Self::new(conn, source, config, Box::new(ThreadSleeper)))
    }

    /// Reference date for player ages.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Players, teams, games, then player box scores. Each stage commits on
    /// its own; a store failure aborts the run but keeps earlier commits.
    pub fn run(&mut self) -> IngestResult<IngestSummary> {
        info!(seasons = ?self.config.seasons, "ingest run starting");
        let mut stages = Vec::with_capacity(4);
        for stage in [Stage::Players, Stage::Teams, Stage::Games, Stage::PlayerGameStats] {
            let result = match stage {
                Stage::Players => self.load_players(),
                Stage::Teams => self.load_teams(),
                Stage::Games => self.load_games(),
                Stage::PlayerGameStats => self.load_player_game_stats(),
            };
            match result {
                Ok(summary) => {
                    info!(
                        stage = %stage,
                        total = summary.units_total,
                        succeeded = summary.units_succeeded,
                        skipped = summary.units_skipped,
                        failed = summary.units_failed(),
                        rows = summary.rows_written,
                        "stage finished"
                    );
                    stages.push(summary);
                }
                Err(err) => {
                    error!(stage = %stage, error = %err, "stage aborted");
                    return Err(err);
                }
            }
        }
        Ok(IngestSummary {
            seasons: self.config.seasons.clone(),
            stages,
        })
    }

    /// Upserts the active player list. Only new players and players with an
    /// incomplete bio pay for a player-info request, unless a full refresh is
    /// configured.
    pub fn load_players(&mut self) -> IngestResult<StageSummary> {
        let Self {
            conn,
            source,
            config,
            sleeper,
            today,
        } = self;
        let executor = RequestExecutor::new(config.retry_policy(), &**sleeper);
        let mut summary = StageSummary::new(Stage::Players);
        let run_id = store::begin_ingest_run(conn, Stage::Players.as_str())?;

        let season = config
            .seasons
            .last()
            .cloned()
            .unwrap_or_else(|| crate::records::DEFAULT_SEASON.to_string());
        let reference = executor.execute("active players", |timeout| {
            source.active_players(&season, timeout)
        });
        executor.pace();
        let reference = match reference {
            Ok(table) => table,
            Err(err) => {
                warn!(season = %season, error = %err, "active player list unavailable");
                summary.push_error(format!("active players {season}: {err}"));
                cool_off_if_transient(&executor, config, &err);
                finish_stage(conn, run_id, &summary)?;
                return Ok(summary);
            }
        };

        let stored = store::player_enrichment_map(conn)
            .map_err(|err| abort_stage(conn, run_id, &mut summary, err))?;
        let mut records = Vec::with_capacity(reference.len());
        for row in reference.iter() {
            summary.units_total += 1;
            match PlayerRecord::from_reference_row(&row) {
                Ok(record) => records.push(record),
                Err(err) => summary.push_error(format!("player row: {err}")),
            }
        }

        let needing_meta = records
            .iter()
            .filter(|p| {
                config.refresh_player_meta
                    || stored.get(&p.id).is_none_or(|e| !e.is_complete())
            })
            .count();
        info!(
            players = records.len(),
            needing_meta,
            refresh_all = config.refresh_player_meta,
            "players loaded from reference list"
        );

        for player in records.iter_mut() {
            let needs_meta = config.refresh_player_meta
                || stored.get(&player.id).is_none_or(|e| !e.is_complete());
            if !needs_meta {
                continue;
            }
            let label = format!("player info {}", player.id);
            let result = executor.execute(&label, |timeout| source.player_info(player.id, timeout));
            executor.pace();
            match result {
                Ok(table) => {
                    if let Some(row) = table.row(0) {
                        player.enrichment = PlayerEnrichment::from_player_info(&row, *today);
                    }
                    debug!(player_id = player.id, name = %player.full_name, "player enriched");
                }
                Err(err) => {
                    warn!(player_id = player.id, error = %err, "player enrichment failed");
                    summary.push_error(format!("player {}: {err}", player.id));
                    cool_off_if_transient(&executor, config, &err);
                }
            }
        }

        let written = write_players(conn, &records)
            .map_err(|err| abort_stage(conn, run_id, &mut summary, err))?;
        summary.rows_written += written;
        summary.units_succeeded += written;

        finish_stage(conn, run_id, &summary)?;
        Ok(summary)
    }

    /// Inserts the static franchise list; rows already stored are left alone.
    pub fn load_teams(&mut self) -> IngestResult<StageSummary> {
        let mut summary = StageSummary::new(Stage::Teams);
        let run_id = store::begin_ingest_run(&self.conn, Stage::Teams.as_str())?;
        let teams = self.source.teams();
        summary.units_total = teams.len();

        let inserted = write_teams(&mut self.conn, &teams)
            .map_err(|err| abort_stage(&self.conn, run_id, &mut summary, err))?;
        summary.units_succeeded = inserted;
        summary.units_skipped = teams.len() - inserted;
        summary.rows_written = inserted;

        finish_stage(&self.conn, run_id, &summary)?;
        Ok(summary)
    }

    /// One game-finder request per configured season, committed per season.
    pub fn load_games(&mut self) -> IngestResult<StageSummary> {
        let Self {
            conn,
            source,
            config,
            sleeper,
            ..
        } = self;
        let executor = RequestExecutor::new(config.retry_policy(), &**sleeper);
        let mut summary = StageSummary::new(Stage::Games);
        let run_id = store::begin_ingest_run(conn, Stage::Games.as_str())?;

        let valid_team_ids = source.teams().iter().map(|t| t.id).collect::<HashSet<_>>();

        for season in &config.seasons {
            summary.units_total += 1;
            let label = format!("season games {season}");
            let result = executor.execute(&label, |timeout| source.season_games(season, timeout));
            executor.pace();
            let table = match result {
                Ok(table) => table,
                Err(err) => {
                    warn!(season = %season, error = %err, "season fetch failed, skipping");
                    summary.push_error(format!("season {season}: {err}"));
                    cool_off_if_transient(&executor, config, &err);
                    continue;
                }
            };

            let mut discarded = 0usize;
            let mut games = Vec::with_capacity(table.len());
            for row in table.iter() {
                let game = match GameRecord::from_finder_row(&row, teams::team_id_for_abbreviation) {
                    Ok(game) => game,
                    Err(err) => {
                        summary.push_error(format!("season {season} game row: {err}"));
                        discarded += 1;
                        continue;
                    }
                };
                if !valid_team_ids.contains(&game.team_id) {
                    discarded += 1;
                    continue;
                }
                games.push(game);
            }
            let inserted = write_games(conn, &games)
                .map_err(|err| abort_stage(conn, run_id, &mut summary, err))?;

            info!(season = %season, rows = table.len(), inserted, discarded, "season games stored");
            summary.rows_written += inserted;
            summary.units_succeeded += 1;
        }

        let unpaired = store::unpaired_game_ids(conn)
            .map_err(|err| abort_stage(conn, run_id, &mut summary, err))?;
        if !unpaired.is_empty() {
            warn!(
                count = unpaired.len(),
                sample = ?unpaired.iter().take(5).collect::<Vec<_>>(),
                "events without a complementary home/away pair"
            );
        }

        finish_stage(conn, run_id, &summary)?;
        Ok(summary)
    }

    /// Box scores for every stored event of the configured seasons that has no
    /// stat rows yet. Each event commits on its own so an interrupted run picks
    /// up at the next unprocessed event.
    pub fn load_player_game_stats(&mut self) -> IngestResult<StageSummary> {
        let Self {
            conn,
            source,
            config,
            sleeper,
            ..
        } = self;
        let executor = RequestExecutor::new(config.retry_policy(), &**sleeper);
        let mut summary = StageSummary::new(Stage::PlayerGameStats);
        let run_id = store::begin_ingest_run(conn, Stage::PlayerGameStats.as_str())?;

        let season_ids = config
            .seasons
            .iter()
            .map(|s| season_to_season_id(s).to_string())
            .collect::<Vec<_>>();
        let pending_state = store::game_ids_for_seasons(conn, &season_ids).and_then(|game_ids| {
            Ok((
                game_ids,
                store::processed_game_ids(conn)?,
                store::player_ids(conn)?,
            ))
        });
        let (game_ids, processed, known_players) =
            pending_state.map_err(|err| abort_stage(conn, run_id, &mut summary, err))?;
        summary.units_total = game_ids.len();

        let pending = game_ids
            .iter()
            .filter(|id| !processed.contains(*id))
            .collect::<Vec<_>>();
        summary.units_skipped = game_ids.len() - pending.len();
        info!(
            events = game_ids.len(),
            already_processed = summary.units_skipped,
            pending = pending.len(),
            "player box scores to fetch"
        );

        for (idx, game_id) in pending.iter().enumerate() {
            let label = format!("box score {game_id}");
            let result = executor.execute(&label, |timeout| source.box_score(game_id, timeout));
            executor.pace();
            let table = match result {
                Ok(table) => table,
                Err(err) => {
                    warn!(game_id = %game_id, error = %err, "box score failed, skipping event");
                    summary.push_error(format!("event {game_id}: {err}"));
                    cool_off_if_transient(&executor, config, &err);
                    continue;
                }
            };

            let mut stats = Vec::with_capacity(table.len());
            let mut dropped = 0usize;
            for row in table.iter() {
                match PlayerGameStatRecord::from_box_score_row(&row) {
                    Ok(stat) if known_players.contains(&stat.player_id) => stats.push(stat),
                    Ok(_) => dropped += 1,
                    Err(err) => {
                        summary.push_error(format!("event {game_id} stat row: {err}"));
                        dropped += 1;
                    }
                }
            }

            match write_event_stats(conn, &stats) {
                Ok(inserted) => {
                    summary.rows_written += inserted;
                    summary.units_succeeded += 1;
                    info!(
                        game_id = %game_id,
                        progress = format!("{}/{}", idx + 1, pending.len()),
                        inserted,
                        dropped,
                        "event stored"
                    );
                }
                Err(err) => {
                    warn!(game_id = %game_id, error = %err, "event rolled back");
                    return Err(abort_stage(conn, run_id, &mut summary, err));
                }
            }
        }

        finish_stage(conn, run_id, &summary)?;
        Ok(summary)
    }

    /// Releases the store connection.
    pub fn close(self) -> IngestResult<()> {
        self.conn
            .close()
            .map_err(|(_, source)| IngestError::Store {
                op: "close sqlite db",
                source,
            })
    }
}

fn write_players(conn: &mut Connection, players: &[PlayerRecord]) -> IngestResult<usize> {
    let tx = conn.transaction().store_ctx("begin players transaction")?;
    for player in players {
        store::upsert_player(&tx, player)?;
    }
    tx.commit().store_ctx("commit players transaction")?;
    Ok(players.len())
}

fn write_teams(conn: &mut Connection, teams: &[TeamRecord]) -> IngestResult<usize> {
    let tx = conn.transaction().store_ctx("begin teams transaction")?;
    let mut inserted = 0usize;
    for team in teams {
        inserted += store::upsert_team(&tx, team)?;
    }
    tx.commit().store_ctx("commit teams transaction")?;
    Ok(inserted)
}

fn write_games(conn: &mut Connection, games: &[GameRecord]) -> IngestResult<usize> {
    let tx = conn.transaction().store_ctx("begin games transaction")?;
    let mut inserted = 0usize;
    for game in games {
        inserted += store::insert_game(&tx, game)?;
    }
    tx.commit().store_ctx("commit games transaction")?;
    Ok(inserted)
}

fn write_event_stats(conn: &mut Connection, stats: &[PlayerGameStatRecord]) -> IngestResult<usize> {
    let tx = conn
        .transaction()
        .store_ctx("begin player stats transaction")?;
    let mut inserted = 0usize;
    for stat in stats {
        inserted += store::insert_player_game_stat(&tx, stat)?;
    }
    tx.commit().store_ctx("commit player stats transaction")?;
    Ok(inserted)
}

fn cool_off_if_transient(executor: &RequestExecutor<'_>, config: &IngestConfig, err: &FetchError) {
    if let Some(duration) = config.cool_off_on_timeout
        && err.is_transient()
    {
        info!(secs = duration.as_secs_f64(), "cooling off after timeout");
        executor.cool_off(duration);
    }
}

/// Records a store failure on the stage's ledger row before the error aborts
/// the run. A ledger write failure is logged; the original error wins.
fn abort_stage(conn: &Connection, run_id: i64, summary: &mut StageSummary, err: IngestError) -> IngestError {
    summary.push_error(err.to_string());
    if let Err(ledger_err) = finish_stage(conn, run_id, summary) {
        error!(run_id, error = %ledger_err, "could not finalize ingest run");
    }
    err
}

fn finish_stage(conn: &Connection, run_id: i64, summary: &StageSummary) -> IngestResult<()> {
    store::finish_ingest_run(
        conn,
        run_id,
        RunTotals {
            units_total: summary.units_total,
            units_succeeded: summary.units_succeeded,
            units_skipped: summary.units_skipped,
            rows_written: summary.rows_written,
            errors: &summary.errors,
        },
    )
}
