use crate::api::{WalkerApi, version_path};
use crate::dom::{Document, NodeId, SharedDocument};
use crate::error::WalkerError;
use crate::glyph::{GlyphSummary, LoadingFallback, Transitions, build_glyph};
use crate::model::PageKind;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const VERSION_WIDGETS: &str = ".versions > div";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionWidget {
    pub node: NodeId,
    pub version: String,
}

/// The page-level entity container and its version widgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityPage {
    pub kind: PageKind,
    pub entity_id: String,
    pub container: NodeId,
    pub widgets: Vec<VersionWidget>,
}

impl EntityPage {
    /// Finds `.article[data-article]` or `.category[data-category]`.
    pub fn discover(doc: &Document) -> Option<Self> {
        let root = doc.root();
        PageKind::ALL.into_iter().find_map(|kind| {
            let container = doc.select_first(root, kind.container_selector())?;
            let entity_id = doc.data(container, kind.as_str())?.to_string();
            let widgets = doc
                .select(container, VERSION_WIDGETS)
                .into_iter()
                .filter_map(|node| match doc.data(node, "version") {
                    Some(version) => Some(VersionWidget {
                        node,
                        version: version.to_string(),
                    }),
                    None => {
                        warn!(%kind, entity = %entity_id, "version widget without data-version, skipping");
                        None
                    }
                })
                .collect();
            Some(Self {
                kind,
                entity_id,
                container,
                widgets,
            })
        })
    }
}

#[derive(Debug)]
pub struct VersionFailure {
    pub kind: PageKind,
    pub version: String,
    pub path: String,
    pub error: WalkerError,
}

pub type VersionFailureHook = Arc<dyn Fn(&VersionFailure) + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WidgetOutcome {
    Rendered {
        version: String,
        summary: GlyphSummary,
    },
    Failed {
        version: String,
        path: String,
        error: String,
    },
}

/// Per-widget outcomes in page order.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub kind: PageKind,
    pub entity_id: String,
    pub outcomes: Vec<WidgetOutcome>,
}

impl LoadReport {
    pub fn rendered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, WidgetOutcome::Rendered { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.rendered()
    }
}

#[derive(Clone)]
pub struct VersionLoader {
    api: Arc<dyn WalkerApi>,
    transitions: Arc<dyn Transitions>,
    fallback: LoadingFallback,
    on_failure: Option<VersionFailureHook>,
}

impl VersionLoader {
    pub fn new(api: Arc<dyn WalkerApi>, transitions: Arc<dyn Transitions>) -> Self {
        Self {
            api,
            transitions,
            fallback: LoadingFallback::default(),
            on_failure: None,
        }
    }

    pub fn with_fallback(mut self, fallback: LoadingFallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_failure_hook(mut self, hook: VersionFailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    /// Fetches and renders every version widget. Each widget is its own
    /// task; a failed fetch leaves that widget in its loading state.
    ///
    /// Returns `None` when the document is not an entity page.
    pub async fn load(&self, doc: &SharedDocument) -> Option<LoadReport> {
        let page = EntityPage::discover(&doc.read())?;
        info!(
            kind = %page.kind,
            entity = %page.entity_id,
            widgets = page.widgets.len(),
            "loading versions"
        );

        let handles: Vec<_> = page
            .widgets
            .into_iter()
            .map(|widget| {
                let loader = self.clone();
                let doc = doc.clone();
                let kind = page.kind;
                let entity_id = page.entity_id.clone();
                tokio::spawn(async move { loader.load_widget(&doc, kind, &entity_id, widget).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(%err, "version task did not complete"),
            }
        }
        Some(LoadReport {
            kind: page.kind,
            entity_id: page.entity_id,
            outcomes,
        })
    }

    async fn load_widget(
        &self,
        doc: &SharedDocument,
        kind: PageKind,
        entity_id: &str,
        widget: VersionWidget,
    ) -> WidgetOutcome {
        match self.api.fetch_version(kind, &widget.version, entity_id).await {
            Ok(payload) => {
                let summary = build_glyph(
                    doc,
                    widget.node,
                    &payload,
                    self.transitions.as_ref(),
                    self.fallback,
                )
                .await;
                debug!(version = %widget.version, "version rendered");
                WidgetOutcome::Rendered {
                    version: widget.version,
                    summary,
                }
            }
            Err(error) => {
                let path = version_path(kind, &widget.version, entity_id);
                warn!(%path, %error, "version fetch failed; widget stays loading");
                let failure = VersionFailure {
                    kind,
                    version: widget.version,
                    path,
                    error,
                };
                if let Some(hook) = &self.on_failure {
                    hook(&failure);
                }
                WidgetOutcome::Failed {
                    error: failure.error.to_string(),
                    version: failure.version,
                    path: failure.path,
                }
            }
        }
    }
}
