//! Fixed GraphQL documents sent to the metadata catalog.
//!
//! Every media selection goes through the `mediaFields` fragment so all queries
//! return the same [`Media`](super::Media) shape.

/// Fields selected for every media object.
pub const MEDIA_FIELDS: &str = r#"
fragment mediaFields on Media {
  id
  idMal
  type
  title { romaji english native }
  description(asHtml: false)
  coverImage { extraLarge large color }
  bannerImage
  format
  status
  episodes
  chapters
  genres
  averageScore
  popularity
  season
  seasonYear
  startDate { year month day }
  nextAiringEpisode { airingAt episode timeUntilAiring }
}
"#;

const PAGE_INFO: &str = "pageInfo { total currentPage lastPage hasNextPage perPage }";

pub const TRENDING: &str = r#"
query ($page: Int, $perPage: Int, $type: MediaType, $sort: [MediaSort]) {
  Page(page: $page, perPage: $perPage) {
    PAGE_INFO
    media(type: $type, sort: $sort, isAdult: false) { ...mediaFields }
  }
}
"#;

pub const SEARCH: &str = r#"
query ($page: Int, $perPage: Int, $search: String, $type: MediaType, $sort: [MediaSort]) {
  Page(page: $page, perPage: $perPage) {
    PAGE_INFO
    media(search: $search, type: $type, sort: $sort, isAdult: false) { ...mediaFields }
  }
}
"#;

pub const MEDIA_BY_ID: &str = r#"
query ($id: Int, $type: MediaType) {
  Media(id: $id, type: $type) { ...mediaFields }
}
"#;

pub const SEASONAL: &str = r#"
query ($page: Int, $perPage: Int, $season: MediaSeason, $seasonYear: Int, $type: MediaType, $sort: [MediaSort]) {
  Page(page: $page, perPage: $perPage) {
    PAGE_INFO
    media(season: $season, seasonYear: $seasonYear, type: $type, sort: $sort, isAdult: false) { ...mediaFields }
  }
}
"#;

pub const BY_MAL_IDS: &str = r#"
query ($page: Int, $perPage: Int, $idMal_in: [Int], $type: MediaType) {
  Page(page: $page, perPage: $perPage) {
    PAGE_INFO
    media(idMal_in: $idMal_in, type: $type) { ...mediaFields }
  }
}
"#;

/// Completes a query document with the shared page info selection and fragment.
pub fn document(query: &str) -> String {
    format!("{}{}", query.replace("PAGE_INFO", PAGE_INFO), MEDIA_FIELDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_carry_the_fragment() {
        for query in [TRENDING, SEARCH, MEDIA_BY_ID, SEASONAL, BY_MAL_IDS] {
            let doc = document(query);
            assert!(doc.contains("...mediaFields"));
            assert!(doc.contains("fragment mediaFields on Media"));
            assert!(!doc.contains("PAGE_INFO"));
        }
    }
}
