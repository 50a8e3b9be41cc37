pub mod api;
pub mod config;
pub mod dom;
pub mod error;
pub mod glyph;
pub mod history;
pub mod loader;
pub mod markup;
pub mod model;
pub mod page;
pub mod runtime;
pub mod search;
pub mod template;
pub mod toggle;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{HttpApi, WalkerApi};
pub use config::WalkerConfig;
pub use dom::{Document, NodeId, SharedDocument};
pub use error::WalkerError;
pub use glyph::{DisplayField, GlyphSummary, LoadingFallback, Transitions, build_glyph};
pub use history::{History, HistoryEntry, MemoryHistory};
pub use loader::{EntityPage, LoadReport, VersionLoader};
pub use model::{EntityId, EntityRef, PageKind, Row, SearchResults, VersionPayload};
pub use runtime::{ReadyReport, Walker};
pub use search::{ResponseOrder, SearchPipeline, SearchState};
pub use template::RowTemplate;
pub use toggle::{IdToggle, IdVisibility};
