/// Letterboxd film grid scraper
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::{CatalogError, Result};
use crate::model::RawFilmCandidate;

/// Source of raw film candidates, most recently rated first
#[async_trait]
pub trait FilmFeed: Send + Sync {
    async fn fetch_candidates(&self) -> Result<Vec<RawFilmCandidate>>;
}

/// Scrapes a user's films sorted by rating date
#[derive(Clone)]
pub struct LetterboxdScraper {
    client: Client,
    site_url: String,
    username: String,
}

impl LetterboxdScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            site_url: config.site_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
        })
    }

    /// Page listing the user's films by rated date
    pub fn films_url(&self) -> String {
        format!(
            "{}/{}/films/by/rated-date/",
            self.site_url,
            urlencoding::encode(&self.username)
        )
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::Scrape(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl FilmFeed for LetterboxdScraper {
    async fn fetch_candidates(&self) -> Result<Vec<RawFilmCandidate>> {
        let url = self.films_url();
        info!("📡 Loading {}", url);

        let html = self.fetch_page(&url).await?;
        let films = parse_film_grid(&html, &self.site_url);
        info!("📊 Found {} total films", films.len());

        if films.is_empty() {
            warn!("⚠️ No film grid items found, the page layout may have changed");
        }
        Ok(films)
    }
}

/// Extract candidates from a film grid page, keeping page order
pub fn parse_film_grid(html: &str, site_url: &str) -> Vec<RawFilmCandidate> {
    let document = Html::parse_document(html);
    let (Ok(item_selector), Ok(component_selector), Ok(rating_selector)) = (
        Selector::parse("li.griditem"),
        Selector::parse(".react-component"),
        Selector::parse("span.rating"),
    ) else {
        return Vec::new();
    };

    document
        .select(&item_selector)
        .filter_map(|item| parse_grid_item(item, &component_selector, &rating_selector, site_url))
        .collect()
}

fn parse_grid_item(
    item: ElementRef<'_>,
    component_selector: &Selector,
    rating_selector: &Selector,
    site_url: &str,
) -> Option<RawFilmCandidate> {
    let component = item.select(component_selector).next()?;
    let slug = component.value().attr("data-item-slug")?.trim();
    let name = component.value().attr("data-item-name")?.trim();
    if slug.is_empty() || name.is_empty() {
        debug!("Skipping grid item without slug or name");
        return None;
    }

    let rating = item
        .select(rating_selector)
        .filter_map(|span| span.value().attr("class"))
        .find_map(rating_from_class)
        .unwrap_or(0.0);

    let slug = format!("/film/{}/", slug);
    Some(RawFilmCandidate {
        name: name.to_string(),
        rating,
        page_url: format!("{}{}", site_url.trim_end_matches('/'), slug),
        slug,
        site_film_id: component.value().attr("data-film-id").map(str::to_string),
    })
}

fn rated_class() -> &'static Regex {
    static RATED_CLASS: OnceLock<Regex> = OnceLock::new();
    RATED_CLASS.get_or_init(|| Regex::new(r"rated-(\d+)").expect("valid rating regex"))
}

/// Stars from a `rated-N` class, where N counts half stars
pub fn rating_from_class(class: &str) -> Option<f32> {
    let half_stars: u32 = rated_class().captures(class)?.get(1)?.as_str().parse().ok()?;
    Some(half_stars as f32 / 2.0)
}

/// Keep candidates at or above `min_rating`, in feed order, at most `max_films`
///
/// An empty selection is an error so that the caller keeps its last good window.
pub fn select_candidates(
    candidates: Vec<RawFilmCandidate>,
    min_rating: f32,
    max_films: usize,
) -> Result<Vec<RawFilmCandidate>> {
    let qualifying: Vec<RawFilmCandidate> = candidates
        .into_iter()
        .filter(|film| film.rating >= min_rating)
        .collect();

    info!("⭐ Films with rating >= {}★: {}", min_rating, qualifying.len());

    if qualifying.is_empty() {
        return Err(CatalogError::NoQualifyingFilms { min_rating });
    }

    Ok(qualifying.into_iter().take(max_films).collect())
}
