//! Candidate ranking for torrent search results.
//!
//! Filters narrow the candidate list stage by stage; every stage can only
//! remove candidates. When nothing survives, old titles fall back to the
//! unfiltered list because they often lack standard-quality releases.

use crate::config::CrawlerConfig;
use crate::trackers::Candidate;

/// Known-id candidates beyond this count always trigger id narrowing.
const CATALOG_ID_MIN_COUNT: usize = 5;

/// Tunables of [`best_match`].
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    pub preferred_audio: String,
    pub old_title_years: i32,
    pub film_size_min_gb: f64,
    pub film_size_max_gb: f64,
    pub film_max_files: u32,
    pub series_candidates: usize,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self::from(&CrawlerConfig::default())
    }
}

impl From<&CrawlerConfig> for MatchSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            preferred_audio: config.preferred_audio.clone(),
            old_title_years: config.old_title_years,
            film_size_min_gb: config.film_size_min_gb,
            film_size_max_gb: config.film_size_max_gb,
            film_max_files: config.film_max_files,
            series_candidates: config.series_candidates.max(1),
        }
    }
}

/// What the search is for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchTarget {
    /// Catalog id of the target, when known.
    pub catalog_id: Option<u64>,
    pub year: i32,
    pub is_film: bool,
}

type Filter<'a> = Box<dyn Fn(&Candidate) -> bool + Send + 'a>;

/// Pick the best candidates for `target`.
///
/// Films get at most one candidate, series up to
/// [`MatchSettings::series_candidates`], ordered by seeders. An empty result
/// means no match.
pub fn best_match(
    candidates: &[Candidate],
    target: &MatchTarget,
    settings: &MatchSettings,
    current_year: i32,
) -> Vec<Candidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let filters = build_filters(candidates, target, settings);
    let mut selected: Vec<&Candidate> = candidates
        .iter()
        .filter(|&c| filters.iter().all(|f| f(c)))
        .collect();

    if selected.is_empty() {
        if target.year >= current_year - settings.old_title_years {
            return Vec::new();
        }
        selected = candidates.iter().collect();
    }

    // Stable sort keeps tracker order among equal seeders.
    selected.sort_by(|a, b| b.seeders.cmp(&a.seeders));
    let limit = if target.is_film {
        1
    } else {
        settings.series_candidates
    };
    selected.into_iter().take(limit).cloned().collect()
}

fn build_filters<'a>(
    candidates: &[Candidate],
    target: &'a MatchTarget,
    settings: &'a MatchSettings,
) -> Vec<Filter<'a>> {
    let mut filters: Vec<Filter<'a>> = Vec::new();
    let total = candidates.len();

    let with_id = candidates.iter().filter(|c| c.catalog_id.is_some()).count();
    if with_id > CATALOG_ID_MIN_COUNT || with_id * 2 > total {
        filters.push(Box::new(|c: &Candidate| c.catalog_id.is_some()));
        if let Some(id) = target.catalog_id {
            filters.push(Box::new(move |c: &Candidate| c.catalog_id == Some(id)));
        }
    }

    if target.is_film {
        filters.push(Box::new(|c: &Candidate| c.file_count < settings.film_max_files));
        filters.push(Box::new(|c: &Candidate| {
            c.size_gb >= settings.film_size_min_gb && c.size_gb <= settings.film_size_max_gb
        }));
    }

    let audio = settings.preferred_audio.as_str();
    if !audio.is_empty() && (total == 1 || candidates.iter().any(|c| c.has_audio(audio))) {
        filters.push(Box::new(move |c: &Candidate| c.has_audio(audio)));
    }

    filters.push(Box::new(|c: &Candidate| !c.advert));
    filters
}
