//! Result presentation pipeline.
//!
//! Derives "what the user sees" from the raw ranked set without going back
//! to the ranking service:
//!
//! ```text
//! raw results ──▶ tag filter ──▶ sort ──▶ page slice
//!      │
//!      └──▶ facets (top N tags + "All")
//! ```
//!
//! The presented order is kept as positions into the raw set, so relevancy
//! order is always recovered from the raw set itself and repeated sort toggles
//! cannot drift. Every operation is synchronous and leaves the pipeline in a
//! consistent state: the facets, the filter, and the page always describe the
//! same raw snapshot.

use serde::Serialize;
use std::collections::HashMap;

use crate::models::{Facet, ResultRecord, SortMode, ALL_TAG};

/// One page of the filtered and sorted result set.
#[derive(Debug, Clone, Serialize)]
pub struct PresentedPage {
    pub records: Vec<ResultRecord>,
    pub page: usize,
    pub total_pages: usize,
    /// Size of the filtered set across all pages.
    pub filtered_count: usize,
    pub is_first: bool,
    pub is_last: bool,
}

#[derive(Debug, Clone)]
pub struct ResultPipeline {
    page_size: usize,
    top_tags: usize,
    raw: Vec<ResultRecord>,
    positions: HashMap<String, usize>,
    total_count: u64,
    elapsed_seconds: f64,
    facets: Vec<Facet>,
    active_tag: String,
    sort_mode: SortMode,
    current_page: usize,
    /// Positions into `raw`, filtered and in presentation order.
    view: Vec<usize>,
}

impl ResultPipeline {
    /// `page_size` is clamped to at least 1.
    pub fn new(page_size: usize, top_tags: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            top_tags,
            raw: Vec::new(),
            positions: HashMap::new(),
            total_count: 0,
            elapsed_seconds: 0.0,
            facets: vec![Facet {
                name: ALL_TAG.to_string(),
                count: 0,
            }],
            active_tag: ALL_TAG.to_string(),
            sort_mode: SortMode::Relevancy,
            current_page: 1,
            view: Vec::new(),
        }
    }

    /// Replace the raw set. Resets the tag filter and page; keeps the sort mode.
    pub fn set_raw_results(
        &mut self,
        results: Vec<ResultRecord>,
        total_count: u64,
        elapsed_seconds: f64,
    ) {
        self.positions = results
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        self.facets = compute_facets(&results, self.top_tags);
        self.raw = results;
        self.total_count = total_count;
        self.elapsed_seconds = elapsed_seconds;
        self.active_tag = ALL_TAG.to_string();
        self.current_page = 1;
        self.rebuild_view();
    }

    /// Back to "All" and page 1 over the current raw set.
    pub fn reset_filter(&mut self) {
        self.active_tag = ALL_TAG.to_string();
        self.current_page = 1;
        self.rebuild_view();
    }

    /// Filter by `tag`. Returns `false` (and changes nothing) if `tag` is not
    /// one of the current facets.
    pub fn set_active_tag(&mut self, tag: &str) -> bool {
        if !self.facets.iter().any(|f| f.name == tag) {
            return false;
        }
        self.active_tag = tag.to_string();
        self.current_page = 1;
        self.rebuild_view();
        true
    }

    pub fn set_sort_mode(&mut self, mode: SortMode) {
        self.sort_mode = mode;
        self.rebuild_view();
    }

    /// Move to page `n`, clamped into range. Returns `false` if the page did
    /// not change.
    pub fn set_page(&mut self, n: usize) -> bool {
        let target = n.clamp(1, self.total_pages().max(1));
        if target == self.current_page {
            return false;
        }
        self.current_page = target;
        true
    }

    pub fn presented_page(&self) -> PresentedPage {
        let total_pages = self.total_pages();
        let start = (self.current_page - 1) * self.page_size;
        let records = self
            .view
            .iter()
            .skip(start)
            .take(self.page_size)
            .map(|&i| self.raw[i].clone())
            .collect();

        PresentedPage {
            records,
            page: self.current_page,
            total_pages,
            filtered_count: self.view.len(),
            is_first: self.current_page == 1,
            is_last: self.current_page >= total_pages,
        }
    }

    /// `ceil(filtered / page_size)`; zero when nothing passes the filter.
    pub fn total_pages(&self) -> usize {
        self.view.len().div_ceil(self.page_size)
    }

    pub fn facets(&self) -> &[Facet] {
        &self.facets
    }

    pub fn active_tag(&self) -> &str {
        &self.active_tag
    }

    pub fn sort_mode(&self) -> SortMode {
        self.sort_mode
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn raw_results(&self) -> &[ResultRecord] {
        &self.raw
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    /// Look up a record of the current raw set by id.
    pub fn get(&self, id: &str) -> Option<&ResultRecord> {
        self.positions.get(id).map(|&i| &self.raw[i])
    }

    /// Recompute the filtered, sorted view and clamp the page into range.
    fn rebuild_view(&mut self) {
        let tag = self.active_tag.as_str();
        let mut view: Vec<usize> = self
            .raw
            .iter()
            .enumerate()
            .filter(|(_, r)| tag == ALL_TAG || r.has_tag(tag))
            .map(|(i, _)| i)
            .collect();

        // Position in `raw` is the relevancy rank and the tie-breaker.
        let raw = &self.raw;
        match self.sort_mode {
            SortMode::Relevancy => view.sort_unstable(),
            SortMode::DateNewest => view.sort_by(|&a, &b| {
                raw[b]
                    .published_at
                    .cmp(&raw[a].published_at)
                    .then(a.cmp(&b))
            }),
            SortMode::DateOldest => view.sort_by(|&a, &b| {
                raw[a]
                    .published_at
                    .cmp(&raw[b].published_at)
                    .then(a.cmp(&b))
            }),
        }

        self.view = view;
        self.current_page = self.current_page.clamp(1, self.total_pages().max(1));
    }
}

/// Top `limit` tags by number of records carrying them, preceded by "All".
///
/// Equal counts keep the order in which the tags first appear in the raw set.
fn compute_facets(results: &[ResultRecord], limit: usize) -> Vec<Facet> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut seen = 0usize;
    for record in results {
        let mut record_tags: Vec<&str> = Vec::new();
        for tag in &record.tags {
            let tag = tag.as_str();
            if tag == ALL_TAG || record_tags.contains(&tag) {
                continue;
            }
            record_tags.push(tag);
            let entry = counts.entry(tag).or_insert_with(|| {
                seen += 1;
                (0, seen)
            });
            entry.0 += 1;
        }
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(tag, (count, first))| (tag, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    std::iter::once(Facet {
        name: ALL_TAG.to_string(),
        count: results.len(),
    })
    .chain(ranked.into_iter().take(limit).map(|(tag, count, _)| Facet {
        name: tag.to_string(),
        count,
    }))
    .collect()
}
