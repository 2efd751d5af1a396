//! Extractor tests against a local fixture server and the in-memory browser.

mod common;

use axum::{
    Router,
    response::{Html, Redirect},
    routing::get,
};
use common::{MockState, dead_url, fixtures, mock_provider, serve};
use serde_json::json;
use shiori::browser::ResourceKind;
use shiori::error::ErrorKind;
use shiori::prelude::*;
use shiori::sources::{AnimePaheSource, HiAnimeSource, MangakakalotSource};
use std::sync::atomic::Ordering;
use std::time::Duration;

async fn manga_site() -> String {
    let router = Router::new()
        .route("/search/story/solo_leveling", get(|| async { Html(fixtures::SEARCH_PAGE) }))
        .route(
            "/search/story/solo_leveling_ragnarok",
            get(|| async { Redirect::temporary("/manga/solo-leveling-ragnarok") }),
        )
        .route("/search/story/nothing_here", get(|| async { Html("<html><body><p>No results</p></body></html>") }))
        .route("/manga/:id", get(|| async { Html(fixtures::DETAIL_PAGE) }))
        .route("/chapter/script", get(|| async { Html(fixtures::READER_WITH_SCRIPT) }))
        .route("/chapter/images", get(|| async { Html(fixtures::READER_WITH_IMAGES) }))
        .route("/chapter/empty", get(|| async { Html(fixtures::READER_EMPTY) }));
    serve(router).await
}

fn manga_source(base: &str, state: &std::sync::Arc<MockState>) -> MangakakalotSource {
    MangakakalotSource::new(base, mock_provider(state)).with_settle_delay(Duration::ZERO)
}

#[cfg(test)]
mod mangakakalot {
    use super::*;

    #[tokio::test]
    async fn test_search_parses_listing() {
        let base = manga_site().await;
        let state = MockState::new();
        let source = manga_source(&base, &state);

        let results = source.search("Solo Leveling").await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "solo-leveling");
        assert_eq!(results[0].title, "Solo Leveling");
        assert_eq!(results[0].url, "https://manga.example/manga/solo-leveling");
        assert_eq!(
            results[0].thumbnail_url.as_deref(),
            Some("https://cdn.example/covers/solo.jpg")
        );
        assert_eq!(results[0].latest_label.as_deref(), Some("Chapter 200"));
        assert_eq!(results[0].author.as_deref(), Some("Chugong"));
        assert_eq!(results[1].id, "solo-leveling-ragnarok");
        assert_eq!(results[1].url, format!("{}/manga/solo-leveling-ragnarok", base));
        assert_eq!(state.launches(), 0);
    }

    #[tokio::test]
    async fn test_single_hit_search_follows_redirect() {
        let base = manga_site().await;
        let state = MockState::new();
        let source = manga_source(&base, &state);

        let results = source.search("solo leveling: ragnarok").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "solo-leveling-ragnarok");
        assert_eq!(results[0].title, "Solo Leveling");
        assert_eq!(results[0].url, format!("{}/manga/solo-leveling-ragnarok", base));
        assert_eq!(results[0].alt_names.len(), 3);
    }

    #[tokio::test]
    async fn test_search_without_hits_is_empty() {
        let base = manga_site().await;
        let state = MockState::new();
        let source = manga_source(&base, &state);

        let results = source.search("nothing here").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_details_and_chapters() {
        let base = manga_site().await;
        let state = MockState::new();
        let source = manga_source(&base, &state);

        let details = source.get_details("solo-leveling").await.unwrap();
        assert_eq!(details.id, "solo-leveling");
        assert_eq!(details.title, "Solo Leveling");
        assert_eq!(details.author.as_deref(), Some("Chugong"));
        assert_eq!(details.status.as_deref(), Some("Completed"));
        assert_eq!(details.genres, vec!["Action", "Fantasy"]);
        assert_eq!(
            details.alt_names,
            vec!["Na Honjaman Level Up", "나 혼자만 레벨업", "Ore Dake Level Up na Ken"]
        );
        assert_eq!(details.synopsis.as_deref(), Some("Ten years ago, the Gate appeared."));
        assert_eq!(details.canonical_url, format!("{}/manga/solo-leveling", base));

        let chapters = source.get_chapters("solo-leveling").await.unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].id, "chapter-2");
        assert_eq!(chapters[0].order_index, 0);
        assert_eq!(chapters[0].number, Some(2.0));
        assert_eq!(chapters[0].uploaded_at.as_deref(), Some("Jan 03,24"));
        assert_eq!(chapters[1].id, "chapter-1");
        assert_eq!(chapters[1].url, format!("{}/chapter/solo-leveling/chapter-1", base));
    }

    #[tokio::test]
    async fn test_pages_fast_path_skips_browser() {
        let base = manga_site().await;
        let state = MockState::new();
        let source = manga_source(&base, &state);

        let pages = source.get_pages(&format!("{}/chapter/script", base)).await.unwrap();

        let urls: Vec<&str> = pages.iter().map(|p| p.image_url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://cdn.example/ch1/01.jpg", "https://cdn.example/ch1/02.jpg"]
        );
        assert_eq!(pages[1].index, 1);
        assert_eq!(state.launches(), 0);
    }

    #[tokio::test]
    async fn test_pages_fast_path_reads_img_tags() {
        let base = manga_site().await;
        let state = MockState::new();
        let source = manga_source(&base, &state);

        let pages = source.get_pages(&format!("{}/chapter/images", base)).await.unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].image_url, "https://cdn.example/ch2/01.jpg");
        assert_eq!(state.launches(), 0);
    }

    #[tokio::test]
    async fn test_pages_browser_fallback_runs_once() {
        let base = manga_site().await;
        let state = MockState::new();
        state.on_eval("chapterImages", json!(["//cdn.example/ch3/01.jpg", "//cdn.example/ch3/02.jpg"]));
        let provider = mock_provider(&state);
        let source = MangakakalotSource::new(&base, provider.clone()).with_settle_delay(Duration::ZERO);
        let chapter_url = format!("{}/chapter/empty", base);

        let pages = source.get_pages(&chapter_url).await.unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].image_url, "https://cdn.example/ch3/01.jpg");
        assert_eq!(state.launches(), 1);
        assert_eq!(state.visited(), vec![chapter_url]);
        assert_eq!(state.pages_opened(), 1);
        assert_eq!(state.pages_closed(), 1);
        assert_eq!(state.browser_closes(), 1);
        assert_eq!(provider.open_page_count(), 0);
        assert!(state.blocked.lock().unwrap().contains(&ResourceKind::Image));
    }

    #[tokio::test]
    async fn test_pages_fallback_tries_hydrated_images_next() {
        let base = manga_site().await;
        let state = MockState::new();
        state.on_eval("data-src", json!(["https://cdn.example/ch4/01.jpg"]));
        let source = manga_source(&base, &state);

        let pages = source.get_pages(&format!("{}/chapter/empty", base)).await.unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].image_url, "https://cdn.example/ch4/01.jpg");
    }

    #[tokio::test]
    async fn test_pages_fallback_failure_still_cleans_up() {
        let base = manga_site().await;
        let state = MockState::new();
        state.fail_goto.store(true, Ordering::SeqCst);
        let provider = mock_provider(&state);
        let source = MangakakalotSource::new(&base, provider.clone()).with_settle_delay(Duration::ZERO);

        let result = source.get_pages(&format!("{}/chapter/empty", base)).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Timeout);
        assert_eq!(state.pages_opened(), 1);
        assert_eq!(state.pages_closed(), 1);
        assert_eq!(state.browser_closes(), 1);
        assert_eq!(provider.open_page_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_reader_does_not_launch_browser() {
        let base = dead_url().await;
        let state = MockState::new();
        state.on_eval("chapterImages", json!(["https://cdn.example/ch5/01.jpg"]));
        let source = manga_source(&base, &state);

        let result = source.get_pages(&format!("{}/chapter/solo-leveling/chapter-1", base)).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Transport);
        assert_eq!(state.launches(), 0);
        assert_eq!(state.pages_opened(), 0);
    }

    #[tokio::test]
    async fn test_hot_updates_render_in_browser() {
        let base = manga_site().await;
        let state = MockState::new();
        state.document(&base, fixtures::HOT_PAGE);
        let provider = mock_provider(&state);
        let source = MangakakalotSource::new(&base, provider.clone());

        let updates = source.get_hot_updates().await.unwrap();

        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].title, "Solo Leveling");
        assert_eq!(updates[0].latest_chapter.as_deref(), Some("Chapter 201"));
        assert_eq!(updates[1].url, format!("{}/manga/omniscient-reader", base));
        assert_eq!(
            updates[1].thumbnail_url.as_deref(),
            Some("https://cdn.example/covers/orv.jpg")
        );
        assert_eq!(provider.open_page_count(), 0);
        assert_eq!(state.browser_closes(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported_as_launch_error() {
        let base = manga_site().await;
        let state = MockState::new();
        state.fail_launch.store(true, Ordering::SeqCst);
        let source = manga_source(&base, &state);

        let error = source.get_hot_updates().await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Launch);
        assert_eq!(state.pages_opened(), 0);
    }
}

#[cfg(test)]
mod animepahe {
    use super::*;

    const BASE: &str = "https://video.test";

    const SEARCH_JSON: &str = r#"{"total":1,"data":[{"id":5,"title":"Jujutsu Kaisen 2nd Season","type":"TV","episodes":23,"status":"Finished Airing","season":"Summer","year":2023,"score":8.8,"poster":"https://i.test/jjk2.jpg","session":"jjk2-session"}]}"#;

    const RELEASE_JSON: &str = r#"{"total":23,"per_page":2,"current_page":1,"last_page":12,"data":[{"id":1,"anime_id":5,"episode":1,"title":"","snapshot":"https://i.test/s1.jpg","duration":"00:23:40","session":"ep-one"},{"id":2,"anime_id":5,"episode":2,"title":"","snapshot":"https://i.test/s2.jpg","duration":"00:23:40","session":"ep-two"}]}"#;

    const PLAY_PAGE: &str = r#"<html><body>
<div id="resolutionMenu" class="dropdown-menu">
  <button data-src="https://kwik.test/e/aaa" data-fansub="SubsPlease" data-resolution="1080" data-audio="jpn" class="dropdown-item">SubsPlease · 1080p</button>
  <button data-src="https://kwik.test/e/bbb" data-fansub="Crunchyroll" data-resolution="720" data-audio="eng" class="dropdown-item">Crunchyroll · 720p (eng)</button>
</div>
</body></html>"#;

    const PACKED_EMBED: &str = r#"<html><body><video id="player"></video>
<script>eval(function(p,a,c,k,e,d){while(c--)if(k[c])p=p.replace(new RegExp('\\b'+c+'\\b','g'),k[c]);return p}('0 1=\'2\';',3,3,'const|source|https://cdn.test/aaa/1080.m3u8'.split('|'),0,{}))</script>
</body></html>"#;

    fn video_source(state: &std::sync::Arc<MockState>) -> AnimePaheSource {
        AnimePaheSource::new(BASE, mock_provider(state))
            .with_settle_delay(Duration::ZERO)
            .with_json_wait(Duration::from_millis(300))
    }

    #[tokio::test]
    async fn test_search_waits_for_json_body() {
        let state = MockState::new();
        state.on_eval_at("m=search", "innerText", json!(SEARCH_JSON));
        let source = video_source(&state);

        let results = source.search("jujutsu kaisen").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "jjk2-session");
        assert_eq!(results[0].url, "https://video.test/anime/jjk2-session");
        assert_eq!(results[0].year, Some(2023));
        assert_eq!(results[0].media_type.as_deref(), Some("TV"));
        assert_eq!(results[0].latest_label.as_deref(), Some("23 episodes"));
        assert_eq!(state.pages_opened(), state.pages_closed());
        assert_eq!(state.browser_closes(), 1);
    }

    #[tokio::test]
    async fn test_search_parses_after_bot_wait_expires() {
        let state = MockState::new();
        state.on_eval_at(
            "m=search",
            "innerText",
            json!(format!("Checking your browser... {} ", SEARCH_JSON)),
        );
        let source = video_source(&state);

        let results = source.search("jujutsu kaisen").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Jujutsu Kaisen 2nd Season");
    }

    #[tokio::test]
    async fn test_episode_listing() {
        let state = MockState::new();
        state.on_eval_at("m=release", "innerText", json!(RELEASE_JSON));
        let source = video_source(&state);

        let listing = source.get_episodes("jjk2-session", 1).await.unwrap();

        assert_eq!(listing.current_page, 1);
        assert_eq!(listing.last_page, 12);
        assert_eq!(listing.episodes.len(), 2);
        assert_eq!(listing.episodes[0].id, "ep-one");
        assert_eq!(listing.episodes[0].number, 1.0);
        assert_eq!(listing.episodes[1].order_index, 1);
        assert_eq!(
            listing.episodes[1].url,
            "https://video.test/play/jjk2-session/ep-two"
        );
        assert!(state.visited()[0].contains("id=jjk2-session"));
    }

    #[tokio::test]
    async fn test_stream_links_resolve_each_candidate_independently() {
        let state = MockState::new();
        state.document("https://video.test/play/jjk2-session/ep-one", PLAY_PAGE);
        state.document("https://kwik.test/e/aaa", PACKED_EMBED);
        state.on_eval_at(
            "kwik.test/e/aaa",
            "window.eval",
            json!("const source='https://cdn.test/aaa/1080.m3u8';"),
        );
        let provider = mock_provider(&state);
        let source = AnimePaheSource::new(BASE, provider.clone()).with_settle_delay(Duration::ZERO);

        let candidates = source.get_stream_links("jjk2-session", "ep-one").await.unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].quality, "1080");
        assert_eq!(candidates[0].fansub.as_deref(), Some("SubsPlease"));
        assert_eq!(
            candidates[0].resolved_direct_url.as_deref(),
            Some("https://cdn.test/aaa/1080.m3u8")
        );
        assert!(candidates[0].is_direct_playable);
        assert_eq!(candidates[1].audio_track, "eng");
        assert_eq!(candidates[1].resolved_direct_url, None);
        assert!(!candidates[1].is_direct_playable);

        assert_eq!(state.pages_opened(), 3);
        assert_eq!(state.pages_closed(), 3);
        assert_eq!(provider.open_page_count(), 0);
        assert!(
            state
                .headers
                .lock()
                .unwrap()
                .contains(&("Referer".to_string(), "https://video.test/".to_string()))
        );
    }

    #[tokio::test]
    async fn test_failed_player_lookup_falls_through_to_unpacking() {
        let state = MockState::new();
        state.document("https://video.test/play/jjk2-session/ep-one", PLAY_PAGE);
        state.document("https://kwik.test/e/aaa", PACKED_EMBED);
        state.on_eval_at(
            "kwik.test/e/aaa",
            "window.eval",
            json!("const source='https://cdn.test/aaa/1080.m3u8';"),
        );
        state.fail_eval("video source[src]", 2);
        let provider = mock_provider(&state);
        let source = AnimePaheSource::new(BASE, provider.clone()).with_settle_delay(Duration::ZERO);

        let candidates = source.get_stream_links("jjk2-session", "ep-one").await.unwrap();

        assert_eq!(
            candidates[0].resolved_direct_url.as_deref(),
            Some("https://cdn.test/aaa/1080.m3u8")
        );
        assert!(candidates[0].is_direct_playable);
        assert!(!candidates[1].is_direct_playable);
        assert_eq!(provider.open_page_count(), 0);
    }

    #[tokio::test]
    async fn test_player_source_short_circuits_unpacking() {
        let state = MockState::new();
        state.document("https://video.test/play/a/b", PLAY_PAGE);
        state.on_eval("video source[src]", json!("https://cdn.test/direct.mp4"));
        let source = video_source(&state);

        let candidates = source.get_stream_links("a", "b").await.unwrap();

        assert!(candidates.iter().all(|c| c.is_direct_playable));
        assert!(
            candidates
                .iter()
                .all(|c| c.resolved_direct_url.as_deref() == Some("https://cdn.test/direct.mp4"))
        );
    }
}

#[cfg(test)]
mod hianime {
    use super::*;

    const HOME_PAGE: &str = r#"<html><body>
<div id="slider" class="swiper-container"><div class="swiper-wrapper">
  <div class="swiper-slide">
    <div class="deslide-item">
      <div class="deslide-cover"><div class="deslide-cover-img"><img class="film-poster-img" data-src="https://img.test/op.jpg" alt="One Piece"></div></div>
      <div class="deslide-item-content">
        <div class="desi-sub-text">#1 Spotlight</div>
        <div class="desi-head-title dynamic-name">One Piece</div>
        <div class="sc-detail"><div class="scd-item">TV</div><div class="scd-item"> 24m </div></div>
        <div class="desi-description">Gold Roger was known as the Pirate King.</div>
        <div class="desi-buttons">
          <a href="/watch/one-piece-100" class="btn btn-primary">Watch Now</a>
          <a href="/one-piece-100" class="btn btn-secondary">Detail</a>
        </div>
      </div>
    </div>
  </div>
  <div class="swiper-slide">
    <div class="deslide-item">
      <div class="deslide-item-content">
        <div class="desi-head-title">Dandadan</div>
        <div class="desi-buttons"><a href="/dandadan-19319" class="btn btn-secondary">Detail</a></div>
      </div>
    </div>
  </div>
</div></div>
<div id="trending-home"><div class="swiper-wrapper">
  <div class="swiper-slide"><div class="item">
    <div class="number"><span>01</span><div class="film-title dynamic-name">Solo Leveling Season 2</div></div>
    <a href="/solo-leveling-season-2-19413" class="film-poster"><img data-src="https://img.test/sl2.jpg" class="film-poster-img" alt="Solo Leveling Season 2"></a>
  </div></div>
  <div class="swiper-slide"><div class="item">
    <div class="number"><span>02</span><div class="film-title dynamic-name">Frieren</div></div>
    <a href="/frieren-18542" class="film-poster"><img data-src="https://img.test/fr.jpg" class="film-poster-img" alt="Frieren"></a>
  </div></div>
</div></div>
</body></html>"#;

    const SEARCH_PAGE: &str = r#"<html><body><div class="film_list-wrap">
  <div class="flw-item">
    <div class="film-poster">
      <div class="tick ltr"><div class="tick-item tick-sub">28</div></div>
      <img data-src="https://img.test/fr.jpg" class="film-poster-img" alt="Frieren">
      <a href="/watch/frieren-18542" class="film-poster-ahref"></a>
    </div>
    <div class="film-detail">
      <h3 class="film-name"><a href="/frieren-18542" title="Frieren">Frieren: Beyond Journey's End</a></h3>
      <div class="fd-infor"><span class="fdi-item">TV</span><span class="dot"></span><span class="fdi-item fdi-duration">24m</span></div>
    </div>
  </div>
</div></body></html>"#;

    async fn anime_site() -> String {
        let router = Router::new()
            .route("/home", get(|| async { Html(HOME_PAGE) }))
            .route("/search", get(|| async { Html(SEARCH_PAGE) }));
        serve(router).await
    }

    #[tokio::test]
    async fn test_spotlight() {
        let base = anime_site().await;
        let source = HiAnimeSource::new(&base);

        let slides = source.get_spotlight().await.unwrap();

        assert_eq!(slides.len(), 2);
        assert_eq!(slides[0].rank, 1);
        assert_eq!(slides[0].id, "one-piece-100");
        assert_eq!(slides[0].title, "One Piece");
        assert_eq!(slides[0].url, format!("{}/one-piece-100", base));
        assert_eq!(slides[0].poster_url.as_deref(), Some("https://img.test/op.jpg"));
        assert_eq!(slides[0].details, vec!["TV", "24m"]);
        assert_eq!(slides[1].rank, 2);
        assert_eq!(slides[1].id, "dandadan-19319");
        assert_eq!(slides[1].poster_url, None);
    }

    #[tokio::test]
    async fn test_trending() {
        let base = anime_site().await;
        let source = HiAnimeSource::new(&base);

        let trending = source.get_trending().await.unwrap();

        assert_eq!(trending.len(), 2);
        assert_eq!(trending[0].rank, 1);
        assert_eq!(trending[0].title, "Solo Leveling Season 2");
        assert_eq!(trending[0].id, "solo-leveling-season-2-19413");
        assert_eq!(trending[1].rank, 2);
        assert_eq!(trending[1].poster_url.as_deref(), Some("https://img.test/fr.jpg"));
    }

    #[tokio::test]
    async fn test_search() {
        let base = anime_site().await;
        let source = HiAnimeSource::new(&base);

        let results = source.search("frieren").await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "frieren-18542");
        assert_eq!(results[0].title, "Frieren: Beyond Journey's End");
        assert_eq!(results[0].latest_label.as_deref(), Some("Episode 28"));
        assert_eq!(results[0].media_type.as_deref(), Some("TV"));
        assert_eq!(results[0].source, "hi");
    }
}
