use crate::dom::{Document, NodeId};
use crate::glyph::HIDDEN_CLASS;
use serde::Serialize;

pub const ID_TOGGLE_BUTTON: &str = "#id-toggle-button";
pub const ACTIVE_CLASS: &str = "active";
pub const SHOW_LABEL: &str = "Show IDs";
pub const HIDE_LABEL: &str = "Hide IDs";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IdVisibility {
    pub shown: bool,
}

impl IdVisibility {
    pub fn toggled(self) -> Self {
        Self { shown: !self.shown }
    }

    /// Label offering the opposite of the current state.
    pub fn button_label(self) -> &'static str {
        if self.shown { HIDE_LABEL } else { SHOW_LABEL }
    }
}

/// Writes `state` to every `.id` element and to the button, if any.
pub fn apply_visibility(doc: &mut Document, button: Option<NodeId>, state: IdVisibility) {
    for node in doc.select(doc.root(), ".id") {
        if state.shown {
            doc.remove_class(node, HIDDEN_CLASS);
        } else {
            doc.add_class(node, HIDDEN_CLASS);
        }
    }
    if let Some(button) = button {
        doc.set_text(button, state.button_label());
        if state.shown {
            doc.add_class(button, ACTIVE_CLASS);
        } else {
            doc.remove_class(button, ACTIVE_CLASS);
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdToggle {
    button: NodeId,
    state: IdVisibility,
}

impl IdToggle {
    /// Binds to `#id-toggle-button`. The initial state comes from the
    /// button's `active` class.
    pub fn bind(doc: &Document) -> Option<Self> {
        let button = doc.select_first(doc.root(), ID_TOGGLE_BUTTON)?;
        Some(Self {
            button,
            state: IdVisibility {
                shown: doc.has_class(button, ACTIVE_CLASS),
            },
        })
    }

    pub fn state(&self) -> IdVisibility {
        self.state
    }

    pub fn click(&mut self, doc: &mut Document) -> IdVisibility {
        self.state = self.state.toggled();
        apply_visibility(doc, Some(self.button), self.state);
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph::{DisplayField, append_entity_links};
    use crate::model::EntityRef;

    fn page_with_glyphs(glyphs: usize) -> Document {
        let mut doc = Document::parse(r#"<button id="id-toggle-button" class="btn">Show IDs</button>"#);
        let root = doc.root();
        for g in 0..glyphs {
            let glyph = doc.append_element(root, "div");
            let refs: Vec<EntityRef> = (0..3u64)
                .map(|i| EntityRef::article(i, "x", &format!("/a/{g}/{i}")))
                .collect();
            append_entity_links(&mut doc, glyph, &refs, DisplayField::Name);
        }
        doc
    }

    fn hidden_ids(doc: &Document) -> usize {
        doc.select(doc.root(), ".id")
            .into_iter()
            .filter(|node| doc.has_class(*node, HIDDEN_CLASS))
            .count()
    }

    #[test]
    fn toggle_is_a_two_state_flip_for_any_glyph_count() {
        for glyphs in [0usize, 1, 4] {
            let mut doc = page_with_glyphs(glyphs);
            let mut toggle = IdToggle::bind(&doc).unwrap();
            let button = doc.select_first(doc.root(), ID_TOGGLE_BUTTON).unwrap();
            let total = glyphs * 3;

            for click in 1..=5 {
                let state = toggle.click(&mut doc);
                if click % 2 == 1 {
                    assert!(state.shown);
                    assert_eq!(hidden_ids(&doc), 0);
                    assert_eq!(doc.text(button), HIDE_LABEL);
                    assert!(doc.has_class(button, ACTIVE_CLASS));
                } else {
                    assert!(!state.shown);
                    assert_eq!(hidden_ids(&doc), total);
                    assert_eq!(doc.text(button), SHOW_LABEL);
                    assert!(!doc.has_class(button, ACTIVE_CLASS));
                }
            }
        }
    }

    #[test]
    fn initial_state_reads_active_class_once() {
        let doc = Document::parse(r#"<button id="id-toggle-button" class="btn active">Hide IDs</button>"#);
        let toggle = IdToggle::bind(&doc).unwrap();
        assert!(toggle.state().shown);
        assert_eq!(toggle.state().toggled().button_label(), SHOW_LABEL);
    }

    #[test]
    fn bind_without_button_is_none() {
        assert!(IdToggle::bind(&Document::new()).is_none());
    }
}
