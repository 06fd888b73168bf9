use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use crate::complete::{Candidate, Syntax, match_trigger, synthesize};
use crate::forester::{ForestCache, Forester, NewTree, ProcessBackend};
use crate::model::config::AppConfig;
use crate::model::entry::Forest;
use crate::notice::Reporter;

/// Answer to one completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub range: Range<usize>,
    pub partial: String,
    pub syntax: Syntax,
    pub candidates: Vec<Candidate>,
}

/// Per-request tweaks to the configured `forester new` defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewTreeOverrides {
    pub prefix: Option<String>,
    pub dest: Option<String>,
    pub template: Option<String>,
    pub random: Option<bool>,
}

impl NewTreeOverrides {
    pub fn apply(self, mut base: NewTree) -> NewTree {
        if let Some(prefix) = self.prefix {
            base.prefix = prefix;
        }
        if let Some(dest) = self.dest {
            base.dest = PathBuf::from(dest);
        }
        if let Some(template) = self.template {
            base.template = (!template.trim().is_empty()).then_some(template);
        }
        if let Some(random) = self.random {
            base.random = random;
        }
        base
    }
}

/// Everything one open project needs: configuration, the forester binary
/// and its cached forest.
pub struct Session {
    config: AppConfig,
    cache: ForestCache,
}

impl Session {
    pub fn new(
        root: PathBuf,
        config: AppConfig,
        backend: Arc<dyn ProcessBackend>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let forester = Forester::new(root, config.forester.clone(), backend, reporter.clone());
        let cache = ForestCache::new(forester, reporter);
        Self { config, cache }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &ForestCache {
        &self.cache
    }

    /// Candidates for `line` with the cursor at character `cursor`, or
    /// `None` when the cursor is not inside a tree reference. The forest is
    /// only consulted once a trigger matched.
    pub async fn complete(&self, line: &str, cursor: usize) -> Option<Completion> {
        let found = match_trigger(line, cursor)?;
        let forest = self.cache.get().await;

        Some(Completion {
            candidates: self.candidates(&forest, found.range()),
            range: found.range(),
            partial: found.partial,
            syntax: found.syntax,
        })
    }

    pub fn candidates(&self, forest: &Forest, range: Range<usize>) -> Vec<Candidate> {
        synthesize(forest, range, self.config.completion.show_id_in_label)
    }

    pub async fn new_tree(&self, overrides: NewTreeOverrides) -> Option<PathBuf> {
        let request = overrides.apply(NewTree::from_config(&self.config.new_tree));
        let created = self.cache.forester().new_tree(&request).await;
        if created.is_some() {
            self.cache.invalidate();
        }
        created
    }
}
