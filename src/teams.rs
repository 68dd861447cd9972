use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::records::TeamRecord;

// id, full name, abbreviation, nickname, city, state, year founded
const FRANCHISES: &[(i64, &str, &str, &str, &str, &str, i32)] = &[
    (1610612737, "Atlanta Hawks", "ATL", "Hawks", "Atlanta", "Georgia", 1949),
    (1610612738, "Boston Celtics", "BOS", "Celtics", "Boston", "Massachusetts", 1946),
    (1610612739, "Cleveland Cavaliers", "CLE", "Cavaliers", "Cleveland", "Ohio", 1970),
    (1610612740, "New Orleans Pelicans", "NOP", "Pelicans", "New Orleans", "Louisiana", 2002),
    (1610612741, "Chicago Bulls", "CHI", "Bulls", "Chicago", "Illinois", 1966),
    (1610612742, "Dallas Mavericks", "DAL", "Mavericks", "Dallas", "Texas", 1980),
    (1610612743, "Denver Nuggets", "DEN", "Nuggets", "Denver", "Colorado", 1976),
    (1610612744, "Golden State Warriors", "GSW", "Warriors", "Golden State", "California", 1946),
    (1610612745, "Houston Rockets", "HOU", "Rockets", "Houston", "Texas", 1967),
    (1610612746, "Los Angeles Clippers", "LAC", "Clippers", "Los Angeles", "California", 1970),
    (1610612747, "Los Angeles Lakers", "LAL", "Lakers", "Los Angeles", "California", 1948),
    (1610612748, "Miami Heat", "MIA", "Heat", "Miami", "Florida", 1988),
    (1610612749, "Milwaukee Bucks", "MIL", "Bucks", "Milwaukee", "Wisconsin", 1968),
    (1610612750, "Minnesota Timberwolves", "MIN", "Timberwolves", "Minneapolis", "Minnesota", 1989),
    (1610612751, "Brooklyn Nets", "BKN", "Nets", "Brooklyn", "New York", 1976),
    (1610612752, "New York Knicks", "NYK", "Knicks", "New York", "New York", 1946),
    (1610612753, "Orlando Magic", "ORL", "Magic", "Orlando", "Florida", 1989),
    (1610612754, "Indiana Pacers", "IND", "Pacers", "Indianapolis", "Indiana", 1976),
    (1610612755, "Philadelphia 76ers", "PHI", "76ers", "Philadelphia", "Pennsylvania", 1949),
    (1610612756, "Phoenix Suns", "PHX", "Suns", "Phoenix", "Arizona", 1968),
    (1610612757, "Portland Trail Blazers", "POR", "Trail Blazers", "Portland", "Oregon", 1970),
    (1610612758, "Sacramento Kings", "SAC", "Kings", "Sacramento", "California", 1948),
    (1610612759, "San Antonio Spurs", "SAS", "Spurs", "San Antonio", "Texas", 1976),
    (1610612760, "Oklahoma City Thunder", "OKC", "Thunder", "Oklahoma City", "Oklahoma", 1967),
    (1610612761, "Toronto Raptors", "TOR", "Raptors", "Toronto", "Ontario", 1995),
    (1610612762, "Utah Jazz", "UTA", "Jazz", "Salt Lake City", "Utah", 1974),
    (1610612763, "Memphis Grizzlies", "MEM", "Grizzlies", "Memphis", "Tennessee", 1995),
    (1610612764, "Washington Wizards", "WAS", "Wizards", "Washington", "District of Columbia", 1961),
    (1610612765, "Detroit Pistons", "DET", "Pistons", "Detroit", "Michigan", 1948),
    (1610612766, "Charlotte Hornets", "CHA", "Hornets", "Charlotte", "North Carolina", 1988),
];

static ABBREVIATION_INDEX: Lazy<HashMap<&'static str, i64>> = Lazy::new(|| {
    FRANCHISES
        .iter()
        .map(|(id, _, abbr, ..)| (*abbr, *id))
        .collect()
});

pub fn all_teams() -> Vec<TeamRecord> {
    FRANCHISES
        .iter()
        .map(
            |(id, full_name, abbreviation, nickname, city, state, year_founded)| TeamRecord {
                id: *id,
                full_name: full_name.to_string(),
                abbreviation: abbreviation.to_string(),
                nickname: nickname.to_string(),
                city: city.to_string(),
                state: state.to_string(),
                year_founded: *year_founded,
            },
        )
        .collect()
}

pub fn team_id_for_abbreviation(abbreviation: &str) -> Option<i64> {
    ABBREVIATION_INDEX.get(abbreviation.trim()).copied()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{all_teams, team_id_for_abbreviation};

    #[test]
    fn thirty_unique_franchises() {
        let teams = all_teams();
        assert_eq!(teams.len(), 30);
        let ids = teams.iter().map(|t| t.id).collect::<HashSet<_>>();
        let abbrs = teams
            .iter()
            .map(|t| t.abbreviation.as_str())
            .collect::<HashSet<_>>();
        assert_eq!(ids.len(), 30);
        assert_eq!(abbrs.len(), 30);
    }

    #[test]
    fn resolves_abbreviations() {
        assert_eq!(team_id_for_abbreviation("GSW"), Some(1610612744));
        assert_eq!(team_id_for_abbreviation(" LAL "), Some(1610612747));
        assert_eq!(team_id_for_abbreviation("SEA"), None);
    }
}
