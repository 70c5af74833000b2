//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the blacklist, classifier model and blocked page
//! - Assemble the shared proxy context
//! - Start file watchers for hot reload
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::RecommendedWatcher;
use thiserror::Error;

use crate::classifier::{Classifier, ClassifierAdapter, ClassifierError, DisabledClassifier, ReloadableClassifier};
use crate::config::watcher::FileWatcher;
use crate::config::ProxyConfig;
use crate::http::SyntheticResponses;
use crate::policy::{Blacklist, PolicyGate, SharedBlacklist};
use crate::proxy::ProxyContext;
use crate::render::BuiltinTemplates;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load blacklist {path:?}: {source}")]
    Blacklist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load classifier model {path:?}: {source}")]
    Classifier {
        path: PathBuf,
        #[source]
        source: ClassifierError,
    },

    #[error("failed to load blocked page {path:?}: {source}")]
    BlockedPage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to watch {path:?}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Shared state built once at startup.
pub struct Components {
    pub context: Arc<ProxyContext>,
    pub blacklist: Arc<SharedBlacklist>,
    /// Present only when a model is configured.
    pub classifier: Option<Arc<ReloadableClassifier>>,
}

/// Load policy data and assemble the proxy context.
pub fn build_components(config: &ProxyConfig) -> Result<Components, StartupError> {
    let blacklist = match config.policy.blacklist_path.as_deref().map(Path::new) {
        Some(path) => {
            let list = Blacklist::load(path).map_err(|source| StartupError::Blacklist {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!(path = ?path, entries = list.len(), "Blacklist loaded");
            list
        }
        None => {
            tracing::warn!("No blacklist configured, every host is allowed");
            Blacklist::new()
        }
    };
    let blacklist = Arc::new(SharedBlacklist::new(blacklist));

    let (classifier, adapter) = match config.classifier.model_path.as_deref().map(Path::new) {
        Some(path) => {
            let model = ReloadableClassifier::load(path).map_err(|source| StartupError::Classifier {
                path: path.to_path_buf(),
                source,
            })?;
            let model = Arc::new(model);
            tracing::info!(
                path = ?path,
                categories = model.snapshot().category_names().count(),
                "Classifier model loaded"
            );
            let shared: Arc<dyn Classifier> = model.clone();
            (Some(model), ClassifierAdapter::new(shared))
        }
        None => {
            tracing::warn!("No classifier model configured, content checks always allow");
            (None, ClassifierAdapter::new(Arc::new(DisabledClassifier)))
        }
    };

    let page_path = config.policy.blocked_page_path.as_deref().map(Path::new);
    let responses = SyntheticResponses::load(page_path, Arc::new(BuiltinTemplates)).map_err(|source| {
        StartupError::BlockedPage {
            path: page_path.map(Path::to_path_buf).unwrap_or_default(),
            source,
        }
    })?;

    let gate = PolicyGate::new(Arc::clone(&blacklist), adapter, &config.policy);
    let context = Arc::new(ProxyContext::new(gate, responses, config));

    Ok(Components {
        context,
        blacklist,
        classifier,
    })
}

/// Watch the blacklist and model files. Keep the returned watchers alive.
pub fn start_watchers(config: &ProxyConfig, components: &Components) -> Result<Vec<RecommendedWatcher>, StartupError> {
    let mut watchers = Vec::new();

    if let Some(path) = config.policy.blacklist_path.as_deref().map(Path::new) {
        let blacklist = Arc::clone(&components.blacklist);
        let watcher = FileWatcher::new(path, "blacklist")
            .run(move |path| {
                if let Err(e) = blacklist.reload(path) {
                    tracing::error!(error = %e, path = ?path, "Blacklist reload failed, keeping current list");
                }
            })
            .map_err(|source| StartupError::Watch {
                path: path.to_path_buf(),
                source,
            })?;
        watchers.push(watcher);
    }

    if let (Some(path), Some(classifier)) = (
        config.classifier.model_path.as_deref().map(Path::new),
        components.classifier.as_ref(),
    ) {
        let classifier = Arc::clone(classifier);
        let watcher = FileWatcher::new(path, "classifier model")
            .run(move |path| {
                if let Err(e) = classifier.reload(path) {
                    tracing::error!(error = %e, path = ?path, "Model reload failed, keeping current model");
                }
            })
            .map_err(|source| StartupError::Watch {
                path: path.to_path_buf(),
                source,
            })?;
        watchers.push(watcher);
    }

    Ok(watchers)
}
