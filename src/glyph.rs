use crate::dom::{Document, NodeId, SharedDocument};
use crate::model::{EntityRef, VersionPayload};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

pub const SUPERCATEGORY_CLASS: &str = "supercategory";
pub const SUBCATEGORY_CLASS: &str = "subcategory";
pub const ARTICLE_CLASS: &str = "article";
pub const ID_CLASS: &str = "id";
pub const HIDDEN_CLASS: &str = "hidden";
/// Bootstrap's "faded in" marker.
pub const VISIBLE_CLASS: &str = "in";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayField {
    #[default]
    Name,
    ShortName,
}

impl DisplayField {
    fn pick<'a>(&self, entity: &'a EntityRef) -> Option<&'a str> {
        match self {
            DisplayField::Name => entity.name.as_deref(),
            DisplayField::ShortName => entity.short_name.as_deref(),
        }
    }
}

/// Appends `<a href=url>label <span class="id hidden">id</span></a>` to `parent`.
pub fn append_entity_link(
    doc: &mut Document,
    parent: NodeId,
    entity: &EntityRef,
    field: DisplayField,
) -> NodeId {
    let link = doc.append_element(parent, "a");
    doc.set_attr(link, "href", entity.url.clone());
    doc.append_text(link, format!("{} ", field.pick(entity).unwrap_or_default()));
    let id = doc.append_element(link, "span");
    doc.add_class(id, ID_CLASS);
    doc.add_class(id, HIDDEN_CLASS);
    doc.append_text(
        id,
        entity.id.as_ref().map(ToString::to_string).unwrap_or_default(),
    );
    link
}

/// Existing children of `container` are kept.
pub fn append_entity_links(
    doc: &mut Document,
    container: NodeId,
    entities: &[EntityRef],
    field: DisplayField,
) -> Vec<NodeId> {
    entities
        .iter()
        .map(|entity| append_entity_link(doc, container, entity, field))
        .collect()
}

/// Like [`append_entity_links`] but wraps each link in `<div class=wrapper_class>`.
pub fn append_wrapped_links(
    doc: &mut Document,
    container: NodeId,
    entities: &[EntityRef],
    wrapper_class: &str,
    field: DisplayField,
) -> Vec<NodeId> {
    entities
        .iter()
        .map(|entity| {
            let wrapper = doc.append_element(container, "div");
            doc.add_class(wrapper, wrapper_class);
            append_entity_link(doc, wrapper, entity, field)
        })
        .collect()
}

/// Signals the end of a CSS transition on a node.
#[async_trait]
pub trait Transitions: Send + Sync {
    /// Resolves once the transition on `node` has finished. Returns `false`
    /// when no completion event will ever fire.
    async fn finished(&self, node: NodeId) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateTransitions;

#[async_trait]
impl Transitions for ImmediateTransitions {
    async fn finished(&self, _node: NodeId) -> bool {
        true
    }
}

/// An environment without transition support: completion never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransitions;

#[async_trait]
impl Transitions for NoTransitions {
    async fn finished(&self, _node: NodeId) -> bool {
        false
    }
}

/// What to do with the loading indicator when no transition end fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingFallback {
    /// Leave it without `hidden` until a transition end fires.
    #[default]
    Legacy,
    Hide,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlyphSummary {
    pub supercategories: usize,
    pub subcategories: usize,
    pub articles: usize,
    pub loading_hidden: bool,
}

/// Synchronous half of [`build_glyph`]: renders the three entity lists and
/// starts fading out the loading indicator.
///
/// Returns the counts and the indicator node, if the widget has one.
pub fn render_glyph(
    doc: &mut Document,
    widget: NodeId,
    payload: &VersionPayload,
) -> (GlyphSummary, Option<NodeId>) {
    let mut summary = GlyphSummary::default();
    match doc.select_first(widget, ".glyph") {
        Some(glyph) => {
            let boxes = [
                (".supercategories", &payload.supercategories, SUPERCATEGORY_CLASS, DisplayField::ShortName),
                (".subcategories", &payload.subcategories, SUBCATEGORY_CLASS, DisplayField::ShortName),
                (".articles", &payload.articles, ARTICLE_CLASS, DisplayField::Name),
            ];
            let mut counts = [0usize; 3];
            for (slot, (selector, entities, class, field)) in boxes.into_iter().enumerate() {
                match doc.select_first(glyph, selector) {
                    Some(container) => {
                        counts[slot] = append_wrapped_links(doc, container, entities, class, field).len();
                    }
                    None => debug!(selector, "glyph has no container, skipping"),
                }
            }
            summary.supercategories = counts[0];
            summary.subcategories = counts[1];
            summary.articles = counts[2];
        }
        None => debug!("version widget has no .glyph"),
    }

    let loading = doc.select_first(widget, ".loading");
    if let Some(loading) = loading {
        doc.remove_class(loading, VISIBLE_CLASS);
    }
    debug!(
        supercategories = summary.supercategories,
        subcategories = summary.subcategories,
        articles = summary.articles,
        "rendered glyph"
    );
    (summary, loading)
}

/// Renders `payload` into `widget`, then hides the loading indicator once
/// its fade-out transition completes.
pub async fn build_glyph(
    doc: &SharedDocument,
    widget: NodeId,
    payload: &VersionPayload,
    transitions: &dyn Transitions,
    fallback: LoadingFallback,
) -> GlyphSummary {
    let (mut summary, loading) = {
        let mut guard = doc.write();
        render_glyph(&mut guard, widget, payload)
    };
    if let Some(loading) = loading {
        let fired = transitions.finished(loading).await;
        if fired || fallback == LoadingFallback::Hide {
            doc.write().add_class(loading, HIDDEN_CLASS);
            summary.loading_hidden = true;
        } else {
            debug!("no transition end for loading indicator; leaving it in place");
        }
    }
    summary
}
