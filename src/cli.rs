use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use atty::Stream;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use wikiwalker::loader::WidgetOutcome;
use wikiwalker::page::{VersionSlot, render_entity_page, render_search_page};
use wikiwalker::{
    Document, HttpApi, LoadReport, LoadingFallback, MemoryHistory, PageKind, ResponseOrder,
    Walker, WalkerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "wikiwalker", about = "Hydrate WikiWalker pages against a walker backend", version)]
pub struct Cli {
    /// Origin of the walker backend.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    base_url: String,

    /// Path the search form posts to.
    #[arg(long, global = true, default_value = "/walker")]
    search_path: String,

    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Render search responses in arrival order instead of dropping stale ones.
    #[arg(long, global = true)]
    arrival_order: bool,

    /// Hide loading indicators even when no transition end fires.
    #[arg(long, global = true)]
    hide_loading: bool,

    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load every version glyph of an article page.
    Article(EntityArgs),
    /// Load every version glyph of a category page.
    Category(EntityArgs),
    /// Run one or more searches in sequence on the search page.
    Search {
        /// Queries to submit; the first one is the page's initial search.
        #[arg(required = true)]
        queries: Vec<String>,
    },
    /// Print a page shell without contacting the backend.
    Shell {
        #[arg(value_enum)]
        page: ShellPage,
        /// Entity id for article and category shells, query for the search shell.
        #[arg(default_value = "")]
        target: String,
        #[arg(long = "version")]
        versions: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct EntityArgs {
    /// Article or category id.
    id: String,
    /// Dataset versions to load.
    #[arg(long = "version", required = true)]
    versions: Vec<String>,
    /// Page heading; defaults to the id.
    #[arg(long)]
    title: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ShellPage {
    Article,
    Category,
    Search,
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = WalkerConfig {
        base_url: cli.base_url.trim_end_matches('/').to_string(),
        search_path: cli.search_path.clone(),
        response_order: if cli.arrival_order {
            ResponseOrder::ArrivalOrder
        } else {
            ResponseOrder::LatestWins
        },
        loading_fallback: if cli.hide_loading {
            LoadingFallback::Hide
        } else {
            LoadingFallback::Legacy
        },
        timeout: cli.timeout.map(Duration::from_secs),
        ..WalkerConfig::default()
    };

    match cli.command {
        Command::Article(args) => handle_entity(PageKind::Article, args, config, cli.json),
        Command::Category(args) => handle_entity(PageKind::Category, args, config, cli.json),
        Command::Search { queries } => handle_search(queries, config, cli.json),
        Command::Shell {
            page,
            target,
            versions,
        } => handle_shell(page, &target, &versions, &config.search_path),
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "wikiwalker=warn",
        1 => "wikiwalker=debug",
        _ => "wikiwalker=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn runtime() -> Result<tokio::runtime::Runtime, Box<dyn Error>> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn handle_entity(
    kind: PageKind,
    args: EntityArgs,
    config: WalkerConfig,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let slots: Vec<VersionSlot> = args.versions.iter().map(VersionSlot::new).collect();
    let title = args.title.as_deref().unwrap_or(&args.id);
    let html = render_entity_page(kind, &args.id, title, &slots, &config.search_path)?;
    let api = Arc::new(HttpApi::new(&config.base_url, config.timeout)?);
    let walker = Walker::builder(Document::parse(&html), config, api).build();

    let report = runtime()?.block_on(walker.ready());
    let versions = report
        .versions
        .ok_or("rendered page has no entity container")?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
    } else if stdout_is_tty() {
        print_load_report(&versions);
    } else {
        println!("{}", walker.html());
    }
    Ok(())
}

fn handle_search(
    queries: Vec<String>,
    config: WalkerConfig,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let (initial, rest) = queries
        .split_first()
        .ok_or("at least one query is required")?;
    let html = render_search_page(initial, &config.search_path)?;
    let api = Arc::new(HttpApi::new(&config.base_url, config.timeout)?);
    let history = Arc::new(MemoryHistory::new());
    let walker = Walker::builder(Document::parse(&html), config, api)
        .history(history.clone())
        .build();

    let rt = runtime()?;
    rt.block_on(async {
        walker.ready().await;
        for query in rest {
            walker.submit_search(query).await;
        }
    });

    let state = walker
        .search()
        .map(|search| search.state())
        .ok_or("rendered page has no search form")?;
    let (categories, articles) = result_counts(&walker);

    if as_json {
        let payload = json!({
            "state": state,
            "categories": categories,
            "articles": articles,
            "history": history.entries(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if stdout_is_tty() {
        match &state.displayed {
            Some(search) => {
                println!("Results for \"{search}\":");
                println!("  categories  {categories}");
                println!("  articles    {articles}");
            }
            None => println!("No results for \"{}\".", state.last_search),
        }
        for entry in history.entries() {
            println!("pushState {}", entry.url);
        }
    } else {
        println!("{}", walker.html());
    }
    Ok(())
}

fn handle_shell(
    page: ShellPage,
    target: &str,
    versions: &[String],
    search_path: &str,
) -> Result<(), Box<dyn Error>> {
    let slots: Vec<VersionSlot> = versions.iter().map(VersionSlot::new).collect();
    let html = match page {
        ShellPage::Article => render_entity_page(PageKind::Article, target, target, &slots, search_path)?,
        ShellPage::Category => {
            render_entity_page(PageKind::Category, target, target, &slots, search_path)?
        }
        ShellPage::Search => render_search_page(target, search_path)?,
    };
    println!("{html}");
    Ok(())
}

fn result_counts(walker: &Walker) -> (usize, usize) {
    let doc = walker.document();
    let doc = doc.read();
    let root = doc.root();
    let count = |selector: &str| {
        doc.select(root, selector)
            .first()
            .map(|wrapper| doc.select(*wrapper, "tbody tr").len())
            .unwrap_or(0)
    };
    (count(".results .categories"), count(".results .articles"))
}

fn print_load_report(report: &LoadReport) {
    println!("{} {}: {} rendered, {} failed", report.kind, report.entity_id, report.rendered(), report.failed());
    let width = report
        .outcomes
        .iter()
        .map(|outcome| match outcome {
            WidgetOutcome::Rendered { version, .. } | WidgetOutcome::Failed { version, .. } => version.len(),
        })
        .max()
        .unwrap_or(0)
        .max("VERSION".len());
    println!("{:<width$}  {}", "VERSION", "GLYPH", width = width);
    println!("{:-<width$}  {}", "", "-----", width = width);
    for outcome in &report.outcomes {
        match outcome {
            WidgetOutcome::Rendered { version, summary } => println!(
                "{:<width$}  {} supercategories, {} subcategories, {} articles",
                version,
                summary.supercategories,
                summary.subcategories,
                summary.articles,
                width = width
            ),
            WidgetOutcome::Failed { version, path, error } => {
                println!("{:<width$}  failed: {path}: {error}", version, width = width)
            }
        }
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}
