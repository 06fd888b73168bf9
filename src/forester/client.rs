use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::process::{Executor, Invocation, ProcessBackend, QueryOutcome, Runner};
use crate::model::config::{ForesterConfig, NewTreeConfig};
use crate::notice::Reporter;

/// Parameters for `forester new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTree {
    pub dest: PathBuf,
    pub prefix: String,
    pub template: Option<String>,
    pub random: bool,
}

impl NewTree {
    pub fn from_config(config: &NewTreeConfig) -> Self {
        Self {
            dest: PathBuf::from(&config.dest),
            prefix: config.prefix.clone(),
            template: config.template().map(str::to_string),
            random: config.random,
        }
    }
}

/// The forester executable, bound to one project root.
#[derive(Clone)]
pub struct Forester {
    root: PathBuf,
    config: ForesterConfig,
    runner: Runner,
    executor: Executor,
}

impl Forester {
    pub fn new(
        root: PathBuf,
        config: ForesterConfig,
        backend: Arc<dyn ProcessBackend>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let runner = Runner::new(backend.clone(), config.timeout());
        let executor = Executor::new(backend, reporter);
        Self {
            root,
            config,
            runner,
            executor,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ForesterConfig {
        &self.config
    }

    pub fn query_all_invocation(&self) -> Invocation {
        let mut args = vec!["query".to_string(), "all".to_string()];
        args.extend(self.config.config_file().map(str::to_string));
        self.invocation(args)
    }

    pub async fn query_all(&self) -> QueryOutcome {
        self.runner.run(&self.query_all_invocation()).await
    }

    pub fn new_tree_invocation(&self, request: &NewTree) -> Invocation {
        let mut args = vec![
            "new".to_string(),
            "--dest".to_string(),
            request.dest.to_string_lossy().into_owned(),
            "--prefix".to_string(),
            request.prefix.clone(),
        ];
        if let Some(template) = &request.template {
            args.push(format!("--template={template}"));
        }
        if request.random {
            args.push("--random".to_string());
        }
        args.extend(self.config.config_file().map(str::to_string));
        self.invocation(args)
    }

    /// Create a tree and return the path of its source file.
    pub async fn new_tree(&self, request: &NewTree) -> Option<PathBuf> {
        let stdout = self
            .executor
            .execute(&self.new_tree_invocation(request))
            .await?;
        if stdout.is_empty() {
            tracing::warn!("forester new printed no path");
            return None;
        }

        let path = PathBuf::from(stdout);
        let path = if path.is_absolute() {
            path
        } else {
            self.root.join(path)
        };
        tracing::info!("created tree {}", path.display());
        Some(path)
    }

    fn invocation(&self, args: Vec<String>) -> Invocation {
        Invocation {
            program: PathBuf::from(&self.config.executable),
            args,
            cwd: self.root.clone(),
        }
    }
}
