use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;
use crate::records::TeamRecord;
use crate::teams;

const STATS_BASE_URL: &str = "https://stats.nba.com/stats";
const LEAGUE_ID: &str = "00";
const CONNECT_TIMEOUT_SECS: u64 = 15;
const ERROR_BODY_CHARS: usize = 200;

/// One `resultSets[n]` entry of a stats.nba.com response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    index: HashMap<String, usize>,
}

impl ResultTable {
    pub fn new(name: &str, headers: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self::from_parts(
            name.to_string(),
            headers.iter().map(|h| h.to_string()).collect(),
            rows,
        )
    }

    pub fn from_parts(name: String, headers: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(idx, h)| (h.to_ascii_uppercase(), idx))
            .collect();
        Self {
            name,
            headers,
            rows,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TableRow<'_>> {
        self.rows.iter().map(move |values| TableRow {
            table: self,
            values,
        })
    }

    pub fn row(&self, idx: usize) -> Option<TableRow<'_>> {
        self.rows.get(idx).map(|values| TableRow {
            table: self,
            values,
        })
    }
}

/// Column access by header name. Numbers encoded as strings are accepted,
/// missing columns and JSON nulls read as `None`.
#[derive(Debug, Clone, Copy)]
pub struct TableRow<'a> {
    table: &'a ResultTable,
    values: &'a [Value],
}

impl<'a> TableRow<'a> {
    pub fn value(&self, column: &str) -> Option<&'a Value> {
        let idx = *self.table.index.get(&column.to_ascii_uppercase())?;
        match self.values.get(idx)? {
            Value::Null => None,
            v => Some(v),
        }
    }

    pub fn opt_str(&self, column: &str) -> Option<String> {
        match self.value(column)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn opt_f64(&self, column: &str) -> Option<f64> {
        let v = self.value(column)?;
        if let Some(n) = v.as_f64() {
            return Some(n);
        }
        let parsed = v.as_str()?.trim().parse::<f64>().ok()?;
        parsed.is_finite().then_some(parsed)
    }

    pub fn opt_i64(&self, column: &str) -> Option<i64> {
        let v = self.value(column)?;
        if let Some(n) = v.as_i64() {
            return Some(n);
        }
        if let Some(n) = v.as_f64() {
            return (n.fract() == 0.0).then_some(n as i64);
        }
        v.as_str()?.trim().parse::<i64>().ok()
    }

    pub fn require_i64(&self, column: &str) -> Result<i64, String> {
        self.opt_i64(column)
            .ok_or_else(|| format!("missing or non-integer {column}"))
    }

    pub fn require_str(&self, column: &str) -> Result<String, String> {
        self.opt_str(column)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| format!("missing {column}"))
    }
}

/// Read-only provider of reference lists, season game logs, box scores and
/// player bios. Network operations return the primary result set of the call;
/// `Ok(None)` means the source answered without one.
pub trait StatsSource {
    fn teams(&self) -> Vec<TeamRecord> {
        teams::all_teams()
    }

    fn active_players(
        &self,
        season: &str,
        timeout: Duration,
    ) -> Result<Option<ResultTable>, FetchError>;

    fn player_info(
        &self,
        player_id: i64,
        timeout: Duration,
    ) -> Result<Option<ResultTable>, FetchError>;

    fn season_games(
        &self,
        season: &str,
        timeout: Duration,
    ) -> Result<Option<ResultTable>, FetchError>;

    fn box_score(&self, game_id: &str, timeout: Duration)
    -> Result<Option<ResultTable>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(rename = "resultSets", alias = "resultSet", default)]
    result_sets: Option<ResultSets>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultSets {
    Many(Vec<RawResultSet>),
    One(RawResultSet),
}

#[derive(Debug, Deserialize)]
struct RawResultSet {
    #[serde(default)]
    name: String,
    #[serde(default)]
    headers: Vec<String>,
    #[serde(rename = "rowSet", default)]
    row_set: Vec<Vec<Value>>,
}

/// Parses a stats.nba.com payload into its first result set.
pub fn parse_primary_result_set(raw: &str) -> Result<Option<ResultTable>, FetchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(None);
    }
    let parsed: StatsResponse = serde_json::from_str(trimmed)
        .map_err(|err| FetchError::Decode(format!("stats json: {err}")))?;
    let first = match parsed.result_sets {
        Some(ResultSets::Many(sets)) => sets.into_iter().next(),
        Some(ResultSets::One(set)) => Some(set),
        None => None,
    };
    Ok(first.map(|set| ResultTable::from_parts(set.name, set.headers, set.row_set)))
}

/// Blocking stats.nba.com client. Request timeouts are set per attempt.
pub struct NbaStatsClient {
    client: Client,
    base_url: String,
}

impl NbaStatsClient {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(STATS_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .default_headers(stats_headers())
            .build()
            .map_err(|err| FetchError::Connection(format!("build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<Option<ResultTable>, FetchError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .timeout(timeout)
            .send()
            .map_err(classify_reqwest_error)?;

        let status = resp.status();
        let body = resp.text().map_err(classify_reqwest_error)?;
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                body: body_snippet(&body),
            });
        }
        parse_primary_result_set(&body)
    }
}

impl StatsSource for NbaStatsClient {
    fn active_players(
        &self,
        season: &str,
        timeout: Duration,
    ) -> Result<Option<ResultTable>, FetchError> {
        self.get(
            "commonallplayers",
            &[
                ("IsOnlyCurrentSeason", "1".to_string()),
                ("LeagueID", LEAGUE_ID.to_string()),
                ("Season", season.to_string()),
            ],
            timeout,
        )
    }

    fn player_info(
        &self,
        player_id: i64,
        timeout: Duration,
    ) -> Result<Option<ResultTable>, FetchError> {
        self.get(
            "commonplayerinfo",
            &[
                ("PlayerID", player_id.to_string()),
                ("LeagueID", String::new()),
            ],
            timeout,
        )
    }

    fn season_games(
        &self,
        season: &str,
        timeout: Duration,
    ) -> Result<Option<ResultTable>, FetchError> {
        self.get(
            "leaguegamefinder",
            &[
                ("PlayerOrTeam", "T".to_string()),
                ("LeagueID", LEAGUE_ID.to_string()),
                ("Season", season.to_string()),
            ],
            timeout,
        )
    }

    fn box_score(
        &self,
        game_id: &str,
        timeout: Duration,
    ) -> Result<Option<ResultTable>, FetchError> {
        self.get(
            "boxscoretraditionalv2",
            &[
                ("GameID", game_id.to_string()),
                ("StartPeriod", "0".to_string()),
                ("EndPeriod", "10".to_string()),
                ("StartRange", "0".to_string()),
                ("EndRange", "28800".to_string()),
                ("RangeType", "0".to_string()),
            ],
            timeout,
        )
    }
}

/// The API rejects or stalls requests that do not look like they come from
/// the nba.com site.
fn stats_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
        ),
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.nba.com/"));
    headers.insert(ORIGIN, HeaderValue::from_static("https://www.nba.com"));
    headers.insert("x-nba-stats-origin", HeaderValue::from_static("stats"));
    headers.insert("x-nba-stats-token", HeaderValue::from_static("true"));
    headers
}

/// First characters of an error body, cut on a character boundary.
fn body_snippet(body: &str) -> String {
    body.chars().take(ERROR_BODY_CHARS).collect()
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        FetchError::Connection(err.to_string())
    } else if err.is_decode() || err.is_body() {
        FetchError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        FetchError::Http {
            status: status.as_u16(),
            body: err.to_string(),
        }
    } else {
        FetchError::Connection(err.to_string())
    }
}
