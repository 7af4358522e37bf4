//! TMDB (The Movie Database) client

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{MetadataProvider, MovieMatch};
use crate::config::EnrichmentConfig;
use crate::error::{CatalogError, Result};
use crate::model::is_imdb_id;

/// TMDB REST client
#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
    image_base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MovieDetails {
    #[serde(default)]
    runtime: Option<u32>,
    #[serde(default)]
    imdb_id: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    external_ids: Option<ExternalIds>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    #[serde(default)]
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<SearchResult>,
}

impl TmdbClient {
    pub fn new(api_key: String, config: &EnrichmentConfig) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(CatalogError::Configuration(
                "TMDB API key cannot be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.tmdb_base_url.trim_end_matches('/').to_string(),
            image_base_url: config.tmdb_image_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn poster_url(&self, path: &str) -> String {
        format!("{}{}", self.image_base_url, path)
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut all = vec![("api_key", self.api_key.as_str())];
        all.extend_from_slice(params);
        Url::parse_with_params(&format!("{}{}", self.base_url, path), &all)
            .map_err(|e| CatalogError::Configuration(format!("invalid TMDB URL: {}", e)))
    }

    async fn get_json<T>(&self, url: Url) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        debug!("Requesting TMDB {}", url.path());
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CatalogError::Metadata(format!("TMDB API error {}: {}", status, text)));
        }

        Ok(response.json().await?)
    }

    async fn movie_details(&self, tmdb_id: u64) -> Result<MovieDetails> {
        let url = self.endpoint(
            &format!("/movie/{}", tmdb_id),
            &[("append_to_response", "external_ids")],
        )?;
        self.get_json(url).await
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn search_movie(&self, title: &str, year: Option<&str>) -> Result<Option<MovieMatch>> {
        let mut params = vec![("query", title)];
        if let Some(year) = year {
            params.push(("year", year));
        }
        let url = self.endpoint("/search/movie", &params)?;
        let search: SearchResponse = self.get_json(url).await?;

        let Some(movie) = search.results.into_iter().next() else {
            return Ok(None);
        };

        let details = self.movie_details(movie.id).await?;
        let imdb_id = details
            .external_ids
            .and_then(|ids| ids.imdb_id)
            .or(details.imdb_id)
            .filter(|id| !id.is_empty());

        Ok(Some(MovieMatch {
            tmdb_id: movie.id,
            imdb_id,
            title: movie.title.unwrap_or_else(|| title.to_string()),
            year: movie
                .release_date
                .as_deref()
                .and_then(|date| date.split('-').next())
                .filter(|year| !year.is_empty())
                .map(str::to_string)
                .or_else(|| year.map(str::to_string)),
            runtime: details.runtime.unwrap_or(0),
            poster_url: movie.poster_path.as_deref().map(|path| self.poster_url(path)),
        }))
    }

    async fn lookup_poster(&self, film_id: &str) -> Result<Option<String>> {
        if is_imdb_id(film_id) {
            let url = self.endpoint(
                &format!("/find/{}", film_id),
                &[("external_source", "imdb_id")],
            )?;
            let found: FindResponse = self.get_json(url).await?;
            return Ok(found
                .movie_results
                .into_iter()
                .next()
                .and_then(|movie| movie.poster_path)
                .map(|path| self.poster_url(&path)));
        }

        if let Some(tmdb_id) = film_id.strip_prefix("tmdb_").and_then(|id| id.parse().ok()) {
            let details = self.movie_details(tmdb_id).await?;
            return Ok(details.poster_path.map(|path| self.poster_url(&path)));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TmdbClient {
        TmdbClient::new("secret".to_string(), &EnrichmentConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(TmdbClient::new("  ".to_string(), &EnrichmentConfig::default()).is_err());
    }

    #[test]
    fn test_endpoint_encodes_query() {
        let url = client()
            .endpoint("/search/movie", &[("query", "Amélie & Co"), ("year", "2001")])
            .unwrap();
        assert_eq!(url.path(), "/3/search/movie");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("api_key".to_string(), "secret".to_string())));
        assert!(pairs.contains(&("query".to_string(), "Amélie & Co".to_string())));
    }

    #[test]
    fn test_poster_url() {
        assert_eq!(
            client().poster_url("/abc.jpg"),
            "https://image.tmdb.org/t/p/w500/abc.jpg"
        );
    }

    #[tokio::test]
    async fn test_unknown_id_needs_no_request() {
        let poster = client().lookup_poster("unknown__film_x_").await.unwrap();
        assert!(poster.is_none());
    }

    #[test]
    fn test_details_deserialize() {
        let details: MovieDetails = serde_json::from_str(
            r#"{"runtime":155,"poster_path":"/p.jpg","external_ids":{"imdb_id":"tt1160419"}}"#,
        )
        .unwrap();
        assert_eq!(details.runtime, Some(155));
        assert_eq!(details.external_ids.and_then(|e| e.imdb_id).as_deref(), Some("tt1160419"));
    }
}
