//! Cross-catalog title matching.
//!
//! The metadata catalog and the scraped sites key the same show differently, so a
//! catalog entry is paired with a scraped search result by scoring every candidate
//! against it:
//!
//! | Rule | Score |
//! |---|---|
//! | either normalized title contains the other | +10 |
//! | season numbers equal | +10 |
//! | target season > 1, candidate season 1 with no "season" in its title | −20 |
//! | years differ by at most 1 | +5 |
//! | years differ by more than 2 | −10 |
//! | declared types equal | +3 |
//!
//! The −20 first-season penalty is waived when both years are known and within one of
//! each other: a sequel released under a subtitle ("Culling Game") carries no season
//! marker but airs in the target's year, whereas a stale first season does not.
//!
//! Rules whose inputs are unknown (missing year or type) contribute nothing. Ties go
//! to the earliest candidate.
//!
//! ```rust
//! use shiori::matching::{TitleInfo, best_match};
//!
//! let target = TitleInfo::new("Jujutsu Kaisen Season 3").year(2025).media_type("TV");
//! let candidates = vec![
//!     TitleInfo::new("Jujutsu Kaisen").year(2020),
//!     TitleInfo::new("Jujutsu Kaisen Season 2").year(2023),
//!     TitleInfo::new("Jujutsu Kaisen: Culling Game").year(2025).media_type("TV"),
//! ];
//!
//! let best = best_match(&target, &candidates).unwrap();
//! assert_eq!(best.index, 2);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::SearchResult;

/// Lowest score treated as a usable match.
pub const MIN_MATCH_SCORE: i32 = 5;

const SUBSTRING_BONUS: i32 = 10;
const SEASON_BONUS: i32 = 10;
const FIRST_SEASON_PENALTY: i32 = -20;
const YEAR_CLOSE_BONUS: i32 = 5;
const YEAR_FAR_PENALTY: i32 = -10;
const TYPE_BONUS: i32 = 3;

static SEASON_WORD: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\bseason\s*(\d+)").ok());
static SEASON_ORDINAL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d+)(?:st|nd|rd|th)\s+season\b").ok());

/// The fields matching looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleInfo {
    pub title: String,
    pub year: Option<i32>,
    pub media_type: Option<String>,
}

impl TitleInfo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

impl From<&SearchResult> for TitleInfo {
    fn from(result: &SearchResult) -> Self {
        Self {
            title: result.title.clone(),
            year: result.year,
            media_type: result.media_type.clone(),
        }
    }
}

/// Scoring record for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCandidate {
    /// Position of the candidate in the input slice
    pub index: usize,
    pub target_season: u32,
    pub candidate_season: u32,
    pub score: i32,
}

/// Lower-cases and drops every non-alphanumeric character.
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Season number from "Season N" or "Nth Season", 1 when absent.
pub fn season_number(title: &str) -> u32 {
    [&*SEASON_WORD, &*SEASON_ORDINAL]
        .into_iter()
        .flatten()
        .find_map(|re| re.captures(title))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1)
}

fn mentions_season(title: &str) -> bool {
    title.to_lowercase().contains("season")
}

fn first_word(title: &str) -> Option<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn titles_overlap(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}

/// Scores `candidate` against `target`.
pub fn score_candidate(target: &TitleInfo, candidate: &TitleInfo) -> i32 {
    let mut score = 0;

    if titles_overlap(
        &normalize_title(&target.title),
        &normalize_title(&candidate.title),
    ) {
        score += SUBSTRING_BONUS;
    }

    let target_season = season_number(&target.title);
    let candidate_season = season_number(&candidate.title);
    let year_gap = match (target.year, candidate.year) {
        (Some(a), Some(b)) => Some((a - b).abs()),
        _ => None,
    };

    if target_season == candidate_season {
        score += SEASON_BONUS;
    } else if target_season > 1
        && candidate_season == 1
        && !mentions_season(&candidate.title)
        && !year_gap.is_some_and(|gap| gap <= 1)
    {
        score += FIRST_SEASON_PENALTY;
    }

    match year_gap {
        Some(gap) if gap <= 1 => score += YEAR_CLOSE_BONUS,
        Some(gap) if gap > 2 => score += YEAR_FAR_PENALTY,
        _ => {}
    }

    if let (Some(a), Some(b)) = (&target.media_type, &candidate.media_type) {
        if a.eq_ignore_ascii_case(b) {
            score += TYPE_BONUS;
        }
    }

    score
}

/// Highest-scoring candidate, the earliest one on ties. `None` for no candidates.
pub fn best_match(target: &TitleInfo, candidates: &[TitleInfo]) -> Option<MatchCandidate> {
    let target_season = season_number(&target.title);

    candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| MatchCandidate {
            index,
            target_season,
            candidate_season: season_number(&candidate.title),
            score: score_candidate(target, candidate),
        })
        .fold(None, |best: Option<MatchCandidate>, current| match best {
            Some(b) if b.score >= current.score => Some(b),
            _ => Some(current),
        })
}

/// Whether a scored candidate is good enough to enrich the target with.
///
/// Requires [`MIN_MATCH_SCORE`] and some title relation (containment or a shared
/// first word), so a year and type coincidence alone never counts.
pub fn is_usable(target: &TitleInfo, candidate: &TitleInfo, scored: &MatchCandidate) -> bool {
    if scored.score < MIN_MATCH_SCORE {
        return false;
    }
    titles_overlap(
        &normalize_title(&target.title),
        &normalize_title(&candidate.title),
    ) || (first_word(&target.title).is_some()
        && first_word(&target.title) == first_word(&candidate.title))
}

/// Best usable candidate among search results, or `None` when nothing qualifies.
pub fn find_usable<'a>(
    target: &TitleInfo,
    results: &'a [SearchResult],
) -> Option<(&'a SearchResult, MatchCandidate)> {
    let infos: Vec<TitleInfo> = results.iter().map(TitleInfo::from).collect();
    let best = best_match(target, &infos)?;
    is_usable(target, &infos[best.index], &best).then(|| (&results[best.index], best))
}
