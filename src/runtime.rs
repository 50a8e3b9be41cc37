use crate::api::WalkerApi;
use crate::config::WalkerConfig;
use crate::dom::{Document, SharedDocument};
use crate::glyph::{ImmediateTransitions, Transitions};
use crate::history::{History, MemoryHistory, NoHistory};
use crate::loader::{LoadReport, VersionFailureHook, VersionLoader};
use crate::search::{SEARCH_FORM, SEARCH_INPUT, SearchFailureHook, SearchPipeline, SearchRequest};
use crate::toggle::{IdToggle, IdVisibility};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct ReadyReport {
    pub versions: Option<LoadReport>,
    pub initial_search: Option<String>,
    pub id_toggle: bool,
}

pub struct WalkerBuilder {
    doc: Document,
    config: WalkerConfig,
    api: Arc<dyn WalkerApi>,
    transitions: Arc<dyn Transitions>,
    history: Option<Arc<dyn History>>,
    on_version_failure: Option<VersionFailureHook>,
    on_search_failure: Option<SearchFailureHook>,
}

impl WalkerBuilder {
    pub fn transitions(mut self, transitions: Arc<dyn Transitions>) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn history(mut self, history: Arc<dyn History>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn on_version_failure(mut self, hook: VersionFailureHook) -> Self {
        self.on_version_failure = Some(hook);
        self
    }

    pub fn on_search_failure(mut self, hook: SearchFailureHook) -> Self {
        self.on_search_failure = Some(hook);
        self
    }

    pub fn build(self) -> Walker {
        let doc = self.doc.into_shared();
        let history: Arc<dyn History> = match self.history {
            Some(history) => history,
            None if self.config.history => Arc::new(MemoryHistory::new()),
            None => Arc::new(NoHistory),
        };

        let mut loader = VersionLoader::new(self.api.clone(), self.transitions)
            .with_fallback(self.config.loading_fallback);
        if let Some(hook) = self.on_version_failure {
            loader = loader.with_failure_hook(hook);
        }

        let has_form = {
            let guard = doc.read();
            guard.select_first(guard.root(), SEARCH_FORM).is_some()
        };
        let search = has_form.then(|| {
            let pipeline =
                SearchPipeline::new(doc.clone(), self.api.clone(), history.clone(), &self.config);
            match self.on_search_failure {
                Some(hook) => pipeline.with_failure_hook(hook),
                None => pipeline,
            }
        });

        Walker {
            doc,
            loader,
            search,
            history,
            toggle: Mutex::new(None),
        }
    }
}

pub struct Walker {
    doc: SharedDocument,
    loader: VersionLoader,
    search: Option<SearchPipeline>,
    history: Arc<dyn History>,
    toggle: Mutex<Option<IdToggle>>,
}

impl Walker {
    /// Starts a builder with immediate transitions and in-memory history.
    pub fn builder(doc: Document, config: WalkerConfig, api: Arc<dyn WalkerApi>) -> WalkerBuilder {
        WalkerBuilder {
            doc,
            config,
            api,
            transitions: Arc::new(ImmediateTransitions),
            history: None,
            on_version_failure: None,
            on_search_failure: None,
        }
    }

    pub fn document(&self) -> SharedDocument {
        self.doc.clone()
    }

    pub fn history(&self) -> Arc<dyn History> {
        self.history.clone()
    }

    pub fn search(&self) -> Option<&SearchPipeline> {
        self.search.as_ref()
    }

    pub fn html(&self) -> String {
        self.doc.read().to_html()
    }

    pub async fn ready(&self) -> ReadyReport {
        let toggle = IdToggle::bind(&self.doc.read());
        let id_toggle = toggle.is_some();
        *self.toggle.lock() = toggle;

        let versions = self.loader.load(&self.doc).await;
        let initial_search = match &self.search {
            Some(search) => search.run_initial().await.map(|request| request.query),
            None => None,
        };
        info!(
            versions = versions.as_ref().map(|report| report.outcomes.len()),
            initial_search = initial_search.as_deref(),
            "page ready"
        );
        ReadyReport {
            versions,
            initial_search,
            id_toggle,
        }
    }

    /// Clicks the id toggle button. `None` if the page has none or
    /// [`Walker::ready`] has not run.
    pub fn click_id_toggle(&self) -> Option<IdVisibility> {
        let mut toggle = self.toggle.lock();
        let toggle = toggle.as_mut()?;
        let mut doc = self.doc.write();
        Some(toggle.click(&mut doc))
    }

    /// Types `query` into the search box and submits the form.
    pub async fn submit_search(&self, query: &str) -> Option<SearchRequest> {
        let search = self.search.as_ref()?;
        {
            let mut doc = self.doc.write();
            if let Some(input) = doc.select_first(doc.root(), SEARCH_INPUT) {
                doc.set_attr(input, "value", query);
            }
        }
        search.submit_form().await
    }
}
