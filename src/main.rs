#[cfg(feature = "cli")]
mod cli;

#[cfg(feature = "cli")]
fn main() {
    if let Err(err) = cli::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!(
        "wikiwalker was built with --no-default-features; rebuild with `--features cli` \
         to get the article, category, search and shell commands."
    );
}
