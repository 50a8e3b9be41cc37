use crate::api::WalkerApi;
use crate::config::WalkerConfig;
use crate::dom::{Document, NodeId, SharedDocument};
use crate::error::WalkerError;
use crate::glyph::VISIBLE_CLASS;
use crate::history::{History, HistoryEntry};
use crate::markup;
use crate::model::{Row, SearchResults};
use crate::template::RowTemplate;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SEARCH_FORM: &str = ".search-form";
pub const SEARCH_INPUT: &str = ".search-form input[name=search]";
pub const RESULTS: &str = ".results";
const LOADING_MESSAGE: &str = ".loading-message";
const CONFIRM_MESSAGE: &str = ".confirm-message";
const SEARCH_STRING: &str = ".search-string";
const CATEGORY_TABLE: &str = ".categories";
const ARTICLE_TABLE: &str = ".articles";
const ROW_TEMPLATE: &str = ".row-template";
const COUNT: &str = ".count";

/// How responses to superseded submissions are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ResponseOrder {
    /// Only the response to the latest submission is rendered.
    #[default]
    LatestWins,
    /// Every response is rendered when it arrives, so a slow earlier query
    /// can overwrite a later one.
    ArrivalOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRequest {
    pub token: u64,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum SearchPhase {
    #[default]
    Idle,
    Submitting {
        token: u64,
        query: String,
    },
    Displayed {
        query: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SearchState {
    pub last_search: String,
    /// Token of the most recent submission.
    pub generation: u64,
    pub phase: SearchPhase,
    /// Echoed search string of the results currently painted.
    pub displayed: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SearchEvent {
    Submit(String),
    /// Initial query carried by the page; posts without touching history.
    Restore(String),
    Resolved {
        token: u64,
        results: Option<SearchResults>,
    },
    Failed {
        token: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEffect {
    ShowLoading,
    HideLoading,
    Post(SearchRequest),
    /// Paint results; `None` clears the result area.
    Render(Option<SearchResults>),
    PushHistory { query: String },
}

pub fn reduce(state: &mut SearchState, event: SearchEvent, order: ResponseOrder) -> Vec<SearchEffect> {
    match event {
        SearchEvent::Submit(query) => {
            if query == state.last_search {
                return Vec::new();
            }
            state.generation += 1;
            state.last_search = query.clone();
            let mut effects = if query.is_empty() {
                state.phase = SearchPhase::Idle;
                state.displayed = None;
                vec![SearchEffect::Render(None), SearchEffect::HideLoading]
            } else {
                state.phase = SearchPhase::Submitting {
                    token: state.generation,
                    query: query.clone(),
                };
                vec![
                    SearchEffect::ShowLoading,
                    SearchEffect::Post(SearchRequest {
                        token: state.generation,
                        query: query.clone(),
                    }),
                ]
            };
            effects.push(SearchEffect::PushHistory { query });
            effects
        }
        SearchEvent::Restore(query) => {
            if query.is_empty() {
                return Vec::new();
            }
            state.generation += 1;
            state.last_search = query.clone();
            state.phase = SearchPhase::Submitting {
                token: state.generation,
                query: query.clone(),
            };
            vec![
                SearchEffect::ShowLoading,
                SearchEffect::Post(SearchRequest {
                    token: state.generation,
                    query,
                }),
            ]
        }
        SearchEvent::Resolved { token, results } => {
            if order == ResponseOrder::LatestWins && token != state.generation {
                debug!(token, latest = state.generation, "discarding stale search response");
                return Vec::new();
            }
            state.displayed = results.as_ref().map(|results| results.search.clone());
            state.phase = match &state.displayed {
                Some(query) => SearchPhase::Displayed {
                    query: query.clone(),
                },
                None => SearchPhase::Idle,
            };
            vec![SearchEffect::Render(results), SearchEffect::HideLoading]
        }
        SearchEvent::Failed { token } => {
            if order == ResponseOrder::LatestWins && token != state.generation {
                return Vec::new();
            }
            if matches!(&state.phase, SearchPhase::Submitting { token: pending, .. } if *pending == token)
            {
                state.phase = match &state.displayed {
                    Some(query) => SearchPhase::Displayed {
                        query: query.clone(),
                    },
                    None => SearchPhase::Idle,
                };
            }
            vec![SearchEffect::HideLoading]
        }
    }
}

/// Renders one result table: compiles its `.row-template`, refills `tbody`
/// and updates `.count`. Returns the number of rows written.
pub fn populate_table(doc: &mut Document, wrapper: NodeId, rows: &[Row]) -> Result<usize, WalkerError> {
    let template_node = doc
        .select_first(wrapper, ROW_TEMPLATE)
        .ok_or_else(|| WalkerError::missing(ROW_TEMPLATE))?;
    let template = RowTemplate::compile(&doc.text(template_node))?;
    let tbody = doc
        .select_first(wrapper, "tbody")
        .ok_or_else(|| WalkerError::missing("tbody"))?;
    doc.empty(tbody);
    for row in rows {
        markup::parse_fragment(doc, tbody, &template.render(row));
    }
    if let Some(count) = doc.select_first(wrapper, COUNT) {
        doc.set_text(count, rows.len().to_string());
    }
    Ok(rows.len())
}

/// Paints `results` into the `.results` element, or hides the result area
/// when there are none.
pub fn list_results(
    doc: &mut Document,
    results_el: NodeId,
    results: Option<&SearchResults>,
) -> Result<(), WalkerError> {
    let confirm = doc.select_first(results_el, CONFIRM_MESSAGE);
    let categories = doc.select_first(results_el, CATEGORY_TABLE);
    let articles = doc.select_first(results_el, ARTICLE_TABLE);

    let Some(results) = results else {
        for node in [confirm, categories, articles].into_iter().flatten() {
            doc.remove_class(node, VISIBLE_CLASS);
        }
        return Ok(());
    };

    if let Some(confirm) = confirm {
        if let Some(echo) = doc.select_first(confirm, SEARCH_STRING) {
            doc.set_text(echo, results.search.clone());
        }
        doc.add_class(confirm, VISIBLE_CLASS);
    }
    for (table, rows) in [(categories, &results.categories), (articles, &results.articles)] {
        if let Some(table) = table {
            let written = populate_table(doc, table, rows)?;
            debug!(written, "populated result table");
            doc.add_class(table, VISIBLE_CLASS);
        }
    }
    Ok(())
}

fn set_visible(doc: &mut Document, scope: NodeId, selector: &str, visible: bool) {
    if let Some(node) = doc.select_first(scope, selector) {
        if visible {
            doc.add_class(node, VISIBLE_CLASS);
        } else {
            doc.remove_class(node, VISIBLE_CLASS);
        }
    }
}

pub type SearchFailureHook = Arc<dyn Fn(&SearchRequest, &WalkerError) + Send + Sync>;

pub struct SearchPipeline {
    doc: SharedDocument,
    api: Arc<dyn WalkerApi>,
    history: Arc<dyn History>,
    state: Mutex<SearchState>,
    order: ResponseOrder,
    search_path: String,
    on_failure: Option<SearchFailureHook>,
}

impl SearchPipeline {
    pub fn new(
        doc: SharedDocument,
        api: Arc<dyn WalkerApi>,
        history: Arc<dyn History>,
        config: &WalkerConfig,
    ) -> Self {
        Self {
            doc,
            api,
            history,
            state: Mutex::new(SearchState::default()),
            order: config.response_order,
            search_path: config.search_path.clone(),
            on_failure: None,
        }
    }

    pub fn with_failure_hook(mut self, hook: SearchFailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }

    pub fn state(&self) -> SearchState {
        self.state.lock().clone()
    }

    /// Handles a form submission. Returns the request to post, if any.
    pub fn begin(&self, query: &str) -> Option<SearchRequest> {
        self.dispatch(SearchEvent::Submit(query.to_string()))
    }

    pub fn restore(&self, query: &str) -> Option<SearchRequest> {
        self.dispatch(SearchEvent::Restore(query.to_string()))
    }

    pub async fn fetch(&self, request: &SearchRequest) -> Result<Option<SearchResults>, WalkerError> {
        self.api.post_search(&self.search_path, &request.query).await
    }

    /// Feeds the outcome of a posted request back into the pipeline.
    pub fn complete(&self, request: &SearchRequest, outcome: Result<Option<SearchResults>, WalkerError>) {
        let event = match outcome {
            Ok(results) => SearchEvent::Resolved {
                token: request.token,
                results,
            },
            Err(err) => {
                warn!(query = %request.query, token = request.token, %err, "search request failed");
                if let Some(hook) = &self.on_failure {
                    hook(request, &err);
                }
                SearchEvent::Failed {
                    token: request.token,
                }
            }
        };
        self.dispatch(event);
    }

    pub async fn submit(&self, query: &str) -> Option<SearchRequest> {
        let request = self.begin(query)?;
        info!(query, token = request.token, "submitting search");
        let outcome = self.fetch(&request).await;
        self.complete(&request, outcome);
        Some(request)
    }

    /// Runs the initial query carried by the form's `data-search`, if any.
    pub async fn run_initial(&self) -> Option<SearchRequest> {
        let query = {
            let doc = self.doc.read();
            let form = doc.select_first(doc.root(), SEARCH_FORM)?;
            doc.data(form, "search")?.to_string()
        };
        let request = self.restore(&query)?;
        info!(query = %request.query, "running initial search");
        let outcome = self.fetch(&request).await;
        self.complete(&request, outcome);
        Some(request)
    }

    pub async fn submit_form(&self) -> Option<SearchRequest> {
        let query = {
            let doc = self.doc.read();
            doc.select_first(doc.root(), SEARCH_INPUT)
                .and_then(|input| doc.attr(input, "value"))
                .unwrap_or_default()
                .to_string()
        };
        self.submit(&query).await
    }

    fn dispatch(&self, event: SearchEvent) -> Option<SearchRequest> {
        let mut state = self.state.lock();
        let effects = reduce(&mut state, event, self.order);
        if effects.is_empty() {
            return None;
        }
        let mut posted = None;
        let mut doc = self.doc.write();
        let results_el = doc.select_first(doc.root(), RESULTS);
        for effect in effects {
            match effect {
                SearchEffect::Post(request) => posted = Some(request),
                SearchEffect::PushHistory { query } => {
                    if self.history.supports_push_state() {
                        self.history
                            .push_state(HistoryEntry::for_query(&self.search_path, &query));
                    }
                }
                effect => match results_el {
                    Some(results_el) => paint(&mut doc, results_el, effect),
                    None => debug!("page has no {RESULTS} element"),
                },
            }
        }
        posted
    }
}

fn paint(doc: &mut Document, results_el: NodeId, effect: SearchEffect) {
    match effect {
        SearchEffect::ShowLoading => {
            set_visible(doc, results_el, CONFIRM_MESSAGE, false);
            set_visible(doc, results_el, LOADING_MESSAGE, true);
        }
        SearchEffect::HideLoading => set_visible(doc, results_el, LOADING_MESSAGE, false),
        SearchEffect::Render(results) => {
            if let Err(err) = list_results(doc, results_el, results.as_ref()) {
                warn!(%err, "failed to render search results");
            }
        }
        SearchEffect::Post(_) | SearchEffect::PushHistory { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{MemoryHistory, NoHistory};
    use crate::testing::{FakeApi, SEARCH_PAGE, results};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn posts(effects: &[SearchEffect]) -> Vec<&SearchRequest> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                SearchEffect::Post(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn duplicate_submission_is_a_no_op() {
        let mut state = SearchState::default();
        let first = reduce(&mut state, SearchEvent::Submit("cats".into()), ResponseOrder::LatestWins);
        let second = reduce(&mut state, SearchEvent::Submit("cats".into()), ResponseOrder::LatestWins);
        assert_eq!(posts(&first).len(), 1);
        assert!(second.is_empty());
        assert_eq!(state.generation, 1);
    }

    #[test]
    fn empty_query_clears_without_posting() {
        let mut state = SearchState::default();
        reduce(&mut state, SearchEvent::Submit("cats".into()), ResponseOrder::LatestWins);
        let effects = reduce(&mut state, SearchEvent::Submit(String::new()), ResponseOrder::LatestWins);
        assert!(posts(&effects).is_empty());
        assert_eq!(
            effects,
            vec![
                SearchEffect::Render(None),
                SearchEffect::HideLoading,
                SearchEffect::PushHistory { query: String::new() }
            ]
        );
        assert_eq!(state.phase, SearchPhase::Idle);
    }

    #[test]
    fn initial_empty_submission_is_ignored() {
        let mut state = SearchState::default();
        assert!(reduce(&mut state, SearchEvent::Submit(String::new()), ResponseOrder::LatestWins).is_empty());
    }

    fn race(order: ResponseOrder) -> SearchState {
        let mut state = SearchState::default();
        let dogs = posts(&reduce(&mut state, SearchEvent::Submit("dogs".into()), order))[0].clone();
        let cats = posts(&reduce(&mut state, SearchEvent::Submit("cats".into()), order))[0].clone();
        reduce(
            &mut state,
            SearchEvent::Resolved { token: cats.token, results: Some(results("cats", 1, 1)) },
            order,
        );
        reduce(
            &mut state,
            SearchEvent::Resolved { token: dogs.token, results: Some(results("dogs", 2, 2)) },
            order,
        );
        state
    }

    #[test]
    fn arrival_order_lets_a_slow_earlier_response_win() {
        let state = race(ResponseOrder::ArrivalOrder);
        assert_eq!(state.displayed.as_deref(), Some("dogs"));
        assert_eq!(state.last_search, "cats");
    }

    #[test]
    fn latest_submission_wins_regardless_of_arrival() {
        let state = race(ResponseOrder::LatestWins);
        assert_eq!(state.displayed.as_deref(), Some("cats"));
        assert_eq!(state.phase, SearchPhase::Displayed { query: "cats".into() });
    }

    #[test]
    fn stale_failure_is_ignored_under_latest_wins() {
        let mut state = SearchState::default();
        reduce(&mut state, SearchEvent::Submit("dogs".into()), ResponseOrder::LatestWins);
        reduce(&mut state, SearchEvent::Submit("cats".into()), ResponseOrder::LatestWins);
        let effects = reduce(&mut state, SearchEvent::Failed { token: 1 }, ResponseOrder::LatestWins);
        assert!(effects.is_empty());
        let effects = reduce(&mut state, SearchEvent::Failed { token: 2 }, ResponseOrder::LatestWins);
        assert_eq!(effects, vec![SearchEffect::HideLoading]);
        assert_eq!(state.phase, SearchPhase::Idle);
    }

    fn pipeline(api: Arc<FakeApi>, history: Arc<dyn History>, order: ResponseOrder) -> (SharedDocument, SearchPipeline) {
        let doc = Document::parse(SEARCH_PAGE).into_shared();
        let config = WalkerConfig {
            response_order: order,
            ..WalkerConfig::default()
        };
        let pipeline = SearchPipeline::new(doc.clone(), api, history, &config);
        (doc, pipeline)
    }

    fn has(doc: &Document, selector: &str, class: &str) -> bool {
        let node = doc.select_first(doc.root(), selector).unwrap();
        doc.has_class(node, class)
    }

    #[tokio::test]
    async fn rome_renders_one_article_row_and_zero_categories() {
        let api = Arc::new(FakeApi::default().with_search_json(
            "rome",
            r#"{"search":"rome","categories":[],"articles":[{"title":"Rome"}]}"#,
        ));
        let history = Arc::new(MemoryHistory::new());
        let (doc, pipeline) = pipeline(api.clone(), history.clone(), ResponseOrder::LatestWins);

        pipeline.submit("rome").await.unwrap();

        let doc = doc.read();
        let root = doc.root();
        let articles = doc.select_first(root, ".results .articles").unwrap();
        let rows = doc.select(articles, "tbody tr");
        assert_eq!(rows.len(), 1);
        assert_eq!(doc.text(rows[0]), "Rome");
        let categories = doc.select_first(root, ".results .categories").unwrap();
        let count = doc.select_first(categories, ".count").unwrap();
        assert_eq!(doc.text(count), "0");
        assert!(doc.select(categories, "tbody tr").is_empty());
        let echo = doc.select_first(root, ".confirm-message .search-string").unwrap();
        assert_eq!(doc.text(echo), "rome");
        assert!(has(&doc, ".confirm-message", VISIBLE_CLASS));
        assert!(has(&doc, ".results .articles", VISIBLE_CLASS));
        assert!(!has(&doc, ".loading-message", VISIBLE_CLASS));
        assert_eq!(api.posts(), vec!["/walker rome".to_string()]);
        assert_eq!(history.current().unwrap().url, "/walker?q=rome");
        assert_eq!(history.current().unwrap().title, "WikiWalker: 'rome'");
    }

    #[tokio::test]
    async fn same_query_twice_posts_once() {
        let api = Arc::new(FakeApi::default().with_search("cats", Some(results("cats", 1, 2))));
        let history = Arc::new(MemoryHistory::new());
        let (_doc, pipeline) = pipeline(api.clone(), history.clone(), ResponseOrder::LatestWins);
        assert!(pipeline.submit("cats").await.is_some());
        assert!(pipeline.submit("cats").await.is_none());
        assert_eq!(api.posts().len(), 1);
        assert_eq!(history.entries().len(), 1);
    }

    #[tokio::test]
    async fn empty_query_hides_results_without_network() {
        let api = Arc::new(FakeApi::default().with_search("cats", Some(results("cats", 1, 2))));
        let history = Arc::new(MemoryHistory::new());
        let (doc, pipeline) = pipeline(api.clone(), history.clone(), ResponseOrder::LatestWins);
        pipeline.submit("cats").await;
        pipeline.submit("").await;
        assert_eq!(api.posts().len(), 1);
        let doc = doc.read();
        assert!(!has(&doc, ".confirm-message", VISIBLE_CLASS));
        assert!(!has(&doc, ".results .categories", VISIBLE_CLASS));
        assert!(!has(&doc, ".results .articles", VISIBLE_CLASS));
        assert_eq!(history.current().unwrap().url, "/walker");
        assert_eq!(history.current().unwrap().title, "WikiWalker");
    }

    #[tokio::test]
    async fn clearing_while_a_post_is_pending_hides_loading() {
        let api = Arc::new(FakeApi::default().with_search("cats", Some(results("cats", 1, 2))));
        let (doc, pipeline) = pipeline(api, Arc::new(NoHistory), ResponseOrder::LatestWins);

        let cats = pipeline.begin("cats").unwrap();
        assert!(has(&doc.read(), ".loading-message", VISIBLE_CLASS));
        assert!(pipeline.begin("").is_none());
        let outcome = pipeline.fetch(&cats).await;
        pipeline.complete(&cats, outcome);

        let doc = doc.read();
        assert!(!has(&doc, ".loading-message", VISIBLE_CLASS));
        assert!(!has(&doc, ".results .articles", VISIBLE_CLASS));
        assert!(doc.select(doc.root(), ".results tbody tr").is_empty());
        assert_eq!(pipeline.state().phase, SearchPhase::Idle);
    }

    #[tokio::test]
    async fn failed_post_only_clears_loading_and_reports() {
        let api = Arc::new(FakeApi::default().with_search("cats", Some(results("cats", 1, 2))));
        let history = Arc::new(MemoryHistory::new());
        let (doc, pipeline) = pipeline(api.clone(), history, ResponseOrder::LatestWins);
        let failures = Arc::new(AtomicUsize::new(0));
        let seen = failures.clone();
        let pipeline = pipeline.with_failure_hook(Arc::new(move |_: &SearchRequest, _: &WalkerError| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        pipeline.submit("cats").await;
        pipeline.submit("unknown").await;

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        let doc = doc.read();
        assert!(!has(&doc, ".loading-message", VISIBLE_CLASS));
        let echo = doc.select_first(doc.root(), ".search-string").unwrap();
        assert_eq!(doc.text(echo), "cats");
        assert_eq!(pipeline.state().phase, SearchPhase::Displayed { query: "cats".into() });
    }

    #[tokio::test]
    async fn out_of_order_responses_through_the_pipeline() {
        for (order, expected) in [(ResponseOrder::LatestWins, "cats"), (ResponseOrder::ArrivalOrder, "dogs")] {
            let api = Arc::new(
                FakeApi::default()
                    .with_search("dogs", Some(results("dogs", 0, 2)))
                    .with_search("cats", Some(results("cats", 0, 1))),
            );
            let (doc, pipeline) = pipeline(api, Arc::new(NoHistory), order);
            let dogs = pipeline.begin("dogs").unwrap();
            let cats = pipeline.begin("cats").unwrap();
            let cats_outcome = pipeline.fetch(&cats).await;
            pipeline.complete(&cats, cats_outcome);
            let dogs_outcome = pipeline.fetch(&dogs).await;
            pipeline.complete(&dogs, dogs_outcome);

            let doc = doc.read();
            let echo = doc.select_first(doc.root(), ".search-string").unwrap();
            assert_eq!(doc.text(echo), expected, "{order:?}");
        }
    }

    #[tokio::test]
    async fn initial_search_posts_without_history() {
        let api = Arc::new(FakeApi::default().with_search("rome", Some(results("rome", 1, 1))));
        let history = Arc::new(MemoryHistory::new());
        let doc = Document::parse(&SEARCH_PAGE.replace("data-search=\"\"", "data-search=\"rome\"")).into_shared();
        let pipeline = SearchPipeline::new(doc, api.clone(), history.clone(), &WalkerConfig::default());

        let request = pipeline.run_initial().await.unwrap();
        assert_eq!(request.query, "rome");
        assert_eq!(api.posts().len(), 1);
        assert!(history.entries().is_empty());
        // Re-submitting the restored query is a duplicate.
        assert!(pipeline.submit("rome").await.is_none());
    }

    #[tokio::test]
    async fn submit_form_reads_the_input_value() {
        let api = Arc::new(FakeApi::default().with_search("a b", None));
        let (doc, pipeline) = pipeline(api.clone(), Arc::new(NoHistory), ResponseOrder::LatestWins);
        {
            let mut doc = doc.write();
            let input = doc.select_first(doc.root(), SEARCH_INPUT).unwrap();
            doc.set_attr(input, "value", "a b");
        }
        pipeline.submit_form().await.unwrap();
        assert_eq!(api.posts(), vec!["/walker a b".to_string()]);
        assert_eq!(pipeline.state().phase, SearchPhase::Idle);
    }

    #[test]
    fn broken_row_template_leaves_table_untouched() {
        let mut doc = Document::parse(
            r#"<div class="articles"><span class="count">7</span><script type="text/template" class="row-template"><tr><td><%= title</td></tr></script><table><tbody><tr><td>old</td></tr></tbody></table></div>"#,
        );
        let wrapper = doc.select_first(doc.root(), ".articles").unwrap();
        let err = populate_table(&mut doc, wrapper, &[]).unwrap_err();
        assert!(matches!(err, WalkerError::Template(_)));
        assert_eq!(doc.select(wrapper, "tbody tr").len(), 1);
        let count = doc.select_first(wrapper, ".count").unwrap();
        assert_eq!(doc.text(count), "7");
    }
}
