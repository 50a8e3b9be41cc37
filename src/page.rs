use crate::error::WalkerError;
use crate::model::PageKind;
use askama::Template;

/// One dataset version column on an entity page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSlot {
    pub id: String,
    pub label: String,
}

impl VersionSlot {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: format!("Version {id}"),
            id,
        }
    }
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>WikiWalker: {{ title }}</title>
  </head>
  <body>
    <nav class="navbar">
      <a class="navbar-brand" href="{{ search_path }}">WikiWalker</a>
      <button type="button" id="id-toggle-button" class="btn btn-default" data-toggle="button">Show IDs</button>
    </nav>
    <div class="{{ kind }}" data-{{ kind }}="{{ entity_id }}">
      <h1>{{ title }}</h1>
      <div class="versions">
        {% for version in versions %}
        <div data-version="{{ version.id }}">
          <h2>{{ version.label }}</h2>
          <div class="loading fade in">Loading...</div>
          <div class="glyph">
            <div class="supercategories"></div>
            <div class="subcategories"></div>
            <div class="articles"></div>
          </div>
        </div>
        {% endfor %}
      </div>
    </div>
  </body>
</html>
"#,
    ext = "html"
)]
struct EntityShell<'a> {
    kind: &'a str,
    entity_id: &'a str,
    title: &'a str,
    search_path: &'a str,
    versions: &'a [VersionSlot],
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>{% if search.is_empty() %}WikiWalker{% else %}WikiWalker: '{{ search }}'{% endif %}</title>
  </head>
  <body>
    <nav class="navbar">
      <a class="navbar-brand" href="{{ search_path }}">WikiWalker</a>
      <button type="button" id="id-toggle-button" class="btn btn-default" data-toggle="button">Show IDs</button>
    </nav>
    <form class="search-form" method="post" action="{{ search_path }}" data-search="{{ search }}">
      <input type="search" name="search" class="form-control" placeholder="Search" value="{{ search }}" />
      <button type="submit" class="btn btn-primary">Submit</button>
    </form>
    <div class="results">
      <div class="loading-message fade">Searching...</div>
      <div class="confirm-message fade">Results for &quot;<span class="search-string"></span>&quot;</div>
      <div class="categories fade">
        <h3>Categories (<span class="count">0</span>)</h3>
        <script type="text/template" class="row-template"><tr><td><a href="<%- url %>"><%- short_name %></a></td><td><%= versions %></td><td><%= supercategories %></td><td><%= subcategories %></td><td><%= articles %></td></tr></script>
        <table class="table">
          <thead><tr><th>Category</th><th>Versions</th><th>Supercategories</th><th>Subcategories</th><th>Articles</th></tr></thead>
          <tbody></tbody>
        </table>
      </div>
      <div class="articles fade">
        <h3>Articles (<span class="count">0</span>)</h3>
        <script type="text/template" class="row-template"><tr><td><a href="<%- url %>"><%- name %></a></td><td><%= versions %></td><td><%= categories %></td></tr></script>
        <table class="table">
          <thead><tr><th>Article</th><th>Versions</th><th>Categories</th></tr></thead>
          <tbody></tbody>
        </table>
      </div>
    </div>
  </body>
</html>
"#,
    ext = "html"
)]
struct SearchShell<'a> {
    search: &'a str,
    search_path: &'a str,
}

/// Renders an article or category page with one widget per version.
pub fn render_entity_page(
    kind: PageKind,
    entity_id: &str,
    title: &str,
    versions: &[VersionSlot],
    search_path: &str,
) -> Result<String, WalkerError> {
    let shell = EntityShell {
        kind: kind.as_str(),
        entity_id,
        title,
        search_path,
        versions,
    };
    Ok(shell.render()?)
}

/// Renders the search page. A non-empty `search` is run on page ready.
pub fn render_search_page(search: &str, search_path: &str) -> Result<String, WalkerError> {
    Ok(SearchShell {
        search,
        search_path,
    }
    .render()?)
}
