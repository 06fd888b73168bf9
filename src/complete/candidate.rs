use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use serde::Serialize;
use std::ops::Range;

use crate::model::entry::{Entry, Forest};

/// One completion item offered to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub label: String,
    /// Always the bare tree address; the label is decoration.
    pub insert_text: String,
    pub filter_text: String,
    pub detail: String,
    pub documentation: Option<String>,
    pub range: Range<usize>,
}

impl Candidate {
    pub fn from_entry(entry: &Entry, range: Range<usize>, show_id_in_label: bool) -> Self {
        let id = entry.uri.as_str();

        let label = match &entry.title {
            None => format!("[{id}]"),
            Some(title) if show_id_in_label => format!("[{id}] {title}"),
            Some(title) => title.clone(),
        };

        let filter_text = [Some(id), entry.title.as_deref(), entry.taxon.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            label,
            insert_text: id.to_string(),
            filter_text,
            detail: format!("{} [{id}]", entry.taxon.as_deref().unwrap_or("Tree")),
            documentation: entry.title.clone(),
            range,
        }
    }
}

/// Turn the forest into candidates for one completion request, in forest
/// order. Every candidate replaces the same `range`.
pub fn synthesize(forest: &Forest, range: Range<usize>, show_id_in_label: bool) -> Vec<Candidate> {
    forest
        .iter()
        .map(|entry| Candidate::from_entry(entry, range.clone(), show_id_in_label))
        .collect()
}

/// Fuzzy-rank candidates against their filter text, best first.
///
/// Editors do this themselves; the CLI and picker need it because they are
/// the editor. An empty query keeps forest order.
pub fn rank(candidates: Vec<Candidate>, query: &str, limit: usize) -> Vec<Candidate> {
    if query.is_empty() {
        return candidates.into_iter().take(limit).collect();
    }

    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, Candidate)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            matcher
                .fuzzy_match(&candidate.filter_text, query)
                .map(|score| (score, candidate))
        })
        .collect();

    // Stable sort keeps forest order among equal scores.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .take(limit)
        .map(|(_, candidate)| candidate)
        .collect()
}
