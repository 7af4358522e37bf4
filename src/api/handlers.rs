//! API request handlers

use chrono::Utc;
use tracing::{debug, info};

use super::models::{
    AddonInfo, CatalogResponse, ExtraField, HealthResponse, Manifest, ManifestCatalog,
    ReloadResponse, ServiceInfo,
};
use super::server::AppState;
use crate::cache;
use crate::config::Config;
use crate::error::{CatalogError, Result};
use crate::model::{is_imdb_id, CollectionKind, FilmRecord, MOVIE_TYPE};

/// Collection served under a URL namespace
pub fn resolve_namespace(ns: &str) -> Result<CollectionKind> {
    ns.parse()
        .map_err(|_| CatalogError::UnknownCatalog(ns.to_string()))
}

/// Catalog id advertised for a collection, e.g. `letterboxd_short`
pub fn catalog_id(config: &Config, kind: CollectionKind) -> String {
    format!("{}_{}", config.addon.catalog_prefix, kind)
}

fn catalog_name(config: &Config, kind: CollectionKind) -> String {
    let threshold = config.migration.runtime_threshold_minutes;
    match kind {
        CollectionKind::Recent => format!("{} Recent", config.addon.display_name),
        CollectionKind::Short => format!("{} -{} min", config.addon.display_name, threshold),
        CollectionKind::Long => format!("{} +{} min", config.addon.display_name, threshold),
    }
}

fn catalog_description(config: &Config, kind: CollectionKind) -> String {
    let threshold = config.migration.runtime_threshold_minutes;
    let hours = config.server.shuffle_interval_hours;
    match kind {
        CollectionKind::Recent => format!(
            "The last {} films rated {}★ or more by {} on Letterboxd",
            config.scraper.max_films, config.scraper.min_rating, config.scraper.username
        ),
        CollectionKind::Short => format!(
            "Films under {} minutes from {}'s Letterboxd, reshuffled every {} hours",
            threshold, config.scraper.username, hours
        ),
        CollectionKind::Long => format!(
            "Films of {} minutes or more from {}'s Letterboxd, reshuffled every {} hours",
            threshold, config.scraper.username, hours
        ),
    }
}

/// Manifest for one collection; depends on configuration only
pub fn manifest(config: &Config, kind: CollectionKind) -> Manifest {
    Manifest {
        id: format!("{}.{}", config.addon.id_prefix, kind),
        version: config.addon.version.clone(),
        name: catalog_name(config, kind),
        description: catalog_description(config, kind),
        logo: config.addon.logo.clone(),
        resources: vec!["catalog".to_string()],
        types: vec![MOVIE_TYPE.to_string()],
        catalogs: vec![ManifestCatalog {
            kind: MOVIE_TYPE.to_string(),
            id: catalog_id(config, kind),
            name: catalog_name(config, kind),
            extra: vec![ExtraField {
                name: "skip".to_string(),
                is_required: false,
            }],
        }],
    }
}

/// Parse a skip value; missing, negative or non-numeric values mean 0
pub fn parse_skip(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return 0;
    };
    let raw = raw.trim();
    let raw = raw.strip_suffix(".json").unwrap_or(raw);
    match raw.parse::<i64>() {
        Ok(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
        _ => 0,
    }
}

/// Skip from a path extra segment such as `skip=100.json` or `genre=x&skip=100`
pub fn skip_from_extra(extra: &str) -> usize {
    let extra = extra.strip_suffix(".json").unwrap_or(extra);
    let value = extra.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "skip").then_some(value)
    });
    parse_skip(value)
}

/// One page of a catalog
pub async fn catalog(
    state: &AppState,
    ns: &str,
    content_type: &str,
    requested_id: &str,
    skip: usize,
) -> Result<CatalogResponse> {
    let kind = resolve_namespace(ns)?;
    let requested_id = requested_id.strip_suffix(".json").unwrap_or(requested_id);

    if content_type != MOVIE_TYPE || requested_id != catalog_id(&state.config, kind) {
        return Err(CatalogError::UnknownCatalog(format!(
            "{}/{}/{}",
            ns, content_type, requested_id
        )));
    }

    let snapshot = state.store.snapshot().await;
    let ordered = state.cache.ordered(kind, &snapshot).await;
    let window = cache::page(&ordered, skip, state.config.server.page_size);

    let mut metas = Vec::with_capacity(window.len());
    for film in window {
        metas.push(decorate(state, film.clone()).await);
    }

    info!("📊 {}: serving {} items (skip {}, total {})", kind, metas.len(), skip, ordered.len());
    Ok(CatalogResponse { metas })
}

/// Fill in poster and logo art for a served item
async fn decorate(state: &AppState, mut film: FilmRecord) -> FilmRecord {
    let metahub = state.config.enrichment.metahub_base_url.trim_end_matches('/');

    if film.poster.is_none() {
        if state.config.server.serve_time_enrichment && state.gateway.is_enabled() {
            film.poster = state.gateway.resolve_poster(&film.id).await;
        }
        if film.poster.is_none() && is_imdb_id(&film.id) {
            debug!("Using metahub poster for {}", film.id);
            film.poster = Some(format!("{}/poster/medium/{}", metahub, film.id));
        }
    }

    if film.logo.is_none() && is_imdb_id(&film.id) {
        film.logo = Some(format!("{}/logo/medium/{}", metahub, film.id));
    }

    film
}

/// Re-read storage and drop every cached shuffle
pub async fn reload(state: &AppState) -> ReloadResponse {
    info!("🔄 Manual reload requested");
    let snapshot = state.store.reload().await;
    state.cache.invalidate().await;

    ReloadResponse {
        success: true,
        timestamp: Utc::now(),
        counts: snapshot.counts(),
    }
}

pub fn health_check() -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
    }
}

/// Self-description listing every addon and its manifest URL
pub async fn service_info(state: &AppState) -> ServiceInfo {
    let config = &state.config;
    let snapshot = state.store.snapshot().await;
    let base_url = config.server.base_url.trim_end_matches('/');

    let addons = [CollectionKind::Short, CollectionKind::Long, CollectionKind::Recent]
        .into_iter()
        .map(|kind| AddonInfo {
            name: catalog_name(config, kind),
            manifest: format!("{}/{}/manifest.json", base_url, kind),
            films: snapshot.collection(kind).len(),
        })
        .collect();

    ServiceInfo {
        name: format!("{} Stremio Addons", config.addon.display_name),
        version: config.addon.version.clone(),
        description: format!(
            "Films rated by {} on Letterboxd, split by runtime",
            config.scraper.username
        ),
        addons,
        status: "online".to_string(),
        last_shuffle_short: state.cache.last_shuffle(CollectionKind::Short).await,
        last_shuffle_long: state.cache.last_shuffle(CollectionKind::Long).await,
    }
}
