use crate::api::{WalkerApi, decode_search_body, version_path};
use crate::error::WalkerError;
use crate::model::{PageKind, SearchResults, VersionPayload};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;

pub(crate) const SEARCH_PAGE: &str = r#"<!DOCTYPE html>
<html><body>
<button id="id-toggle-button" class="btn">Show IDs</button>
<form class="search-form" data-search="">
  <input type="search" name="search" value="">
</form>
<div class="results">
  <div class="loading-message fade">Loading</div>
  <div class="confirm-message fade">Results for <span class="search-string"></span></div>
  <div class="categories fade">
    <span class="count"></span>
    <script type="text/template" class="row-template"><tr><td><%- short_name %></td></tr></script>
    <table><tbody></tbody></table>
  </div>
  <div class="articles fade">
    <span class="count"></span>
    <script type="text/template" class="row-template"><tr><td><%= title %></td></tr></script>
    <table><tbody></tbody></table>
  </div>
</div>
</body></html>"#;

pub(crate) fn results(search: &str, categories: usize, articles: usize) -> SearchResults {
    let row = |value: serde_json::Value| match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };
    SearchResults {
        search: search.to_string(),
        categories: (0..categories)
            .map(|i| row(json!({"short_name": format!("{search}-cat-{i}")})))
            .collect(),
        articles: (0..articles)
            .map(|i| row(json!({"title": format!("{search}-{i}")})))
            .collect(),
    }
}

/// In-memory backend. Unknown version paths answer 404 and unknown queries
/// answer 500.
#[derive(Default)]
pub(crate) struct FakeApi {
    versions: HashMap<String, VersionPayload>,
    searches: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub(crate) fn with_version(
        mut self,
        kind: PageKind,
        version: &str,
        entity: &str,
        payload: VersionPayload,
    ) -> Self {
        self.versions
            .insert(version_path(kind, version, entity), payload);
        self
    }

    pub(crate) fn with_search(self, query: &str, results: Option<SearchResults>) -> Self {
        let body = match results {
            Some(results) => serde_json::to_string(&results).unwrap_or_default(),
            None => String::new(),
        };
        self.with_search_json(query, &body)
    }

    pub(crate) fn with_search_json(mut self, query: &str, body: &str) -> Self {
        self.searches.insert(query.to_string(), body.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn gets(&self) -> Vec<String> {
        self.filtered("GET ")
    }

    pub(crate) fn posts(&self) -> Vec<String> {
        self.filtered("POST ")
    }

    fn filtered(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix(prefix).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl WalkerApi for FakeApi {
    async fn fetch_version(
        &self,
        kind: PageKind,
        version: &str,
        entity: &str,
    ) -> Result<VersionPayload, WalkerError> {
        let path = version_path(kind, version, entity);
        self.calls.lock().push(format!("GET {path}"));
        self.versions
            .get(&path)
            .cloned()
            .ok_or(WalkerError::Status {
                url: path,
                status: 404,
            })
    }

    async fn post_search(
        &self,
        path: &str,
        query: &str,
    ) -> Result<Option<SearchResults>, WalkerError> {
        self.calls.lock().push(format!("POST {path} {query}"));
        match self.searches.get(query) {
            Some(body) => decode_search_body(body),
            None => Err(WalkerError::Status {
                url: path.to_string(),
                status: 500,
            }),
        }
    }
}
