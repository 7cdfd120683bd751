use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hirescope_filter::{FacetConfig, FacetKind, FacetStore, FilterSession};
use hirescope_storage::{FileListingSource, ListingCatalog, ListingSource};
use hirescope_web::WebConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hirescope-cli")]
#[command(about = "Faceted listing filter engine command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Evaluate filter criteria against a listings file and print the page as JSON
    Query(QueryArgs),
    /// Print the configured facet groups
    Facets(FacetsArgs),
    /// Print one admin page of a listings file
    Page(PageArgs),
}

#[derive(Debug, Args, Default)]
struct ServeArgs {
    /// Override HIRESCOPE_WEB_PORT
    #[arg(long)]
    port: Option<u16>,
    /// Override HIRESCOPE_LISTINGS (file path or http(s) URL)
    #[arg(long)]
    listings: Option<String>,
    /// Override HIRESCOPE_FACETS
    #[arg(long)]
    facets: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct QueryArgs {
    #[arg(long, default_value = "./fixtures/listings.json")]
    listings: PathBuf,
    #[arg(long)]
    facets: Option<PathBuf>,
    /// Criteria field assignment, e.g. --set keyword=backend
    #[arg(long = "set", value_name = "NAME=VALUE")]
    sets: Vec<String>,
    /// Toggle a set member, e.g. --toggle jobTypes=full-time
    #[arg(long = "toggle", value_name = "NAME=VALUE")]
    toggles: Vec<String>,
    /// Include per-value facet counts in the output
    #[arg(long)]
    counts: bool,
}

#[derive(Debug, Args)]
struct FacetsArgs {
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct PageArgs {
    #[arg(long, default_value = "./fixtures/listings.json")]
    listings: PathBuf,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = 20)]
    per_page: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command.unwrap_or_else(|| Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            let mut config = WebConfig::from_env();
            if let Some(port) = args.port {
                config.port = port;
            }
            if let Some(listings) = args.listings {
                config.listings = hirescope_storage::ListingsLocation::parse(&listings);
            }
            if args.facets.is_some() {
                config.facets_path = args.facets;
            }
            hirescope_web::serve(config).await?;
        }
        Commands::Query(args) => {
            let facets = load_facets(args.facets.as_ref())?;
            let catalog = ListingCatalog::load(Arc::new(FileListingSource::new(&args.listings))).await;
            let session = build_session(facets, &args.sets, &args.toggles)?;

            info!(
                listings = %args.listings.display(),
                criteria = ?session.criteria(),
                "evaluating criteria"
            );
            let snapshot = catalog.snapshot().await;
            let visible = session.visible_results(snapshot.as_ref().map(|s| s.listings.as_slice()));
            let mut out = serde_json::to_value(&visible)?;
            if args.counts {
                if let Ok(snapshot) = &snapshot {
                    let counts = FacetKind::ALL
                        .iter()
                        .map(|kind| (kind.to_string(), session.facet_counts(&snapshot.listings, *kind)))
                        .collect::<BTreeMap<_, _>>();
                    out["facetCounts"] = serde_json::to_value(counts)?;
                }
            }
            println!("{}", serde_json::to_string_pretty(&out)?);
            if visible.is_no_data() {
                bail!("listing data unavailable for {}", args.listings.display());
            }
        }
        Commands::Facets(args) => {
            let facets = load_facets(args.config.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&facets)?);
        }
        Commands::Page(args) => {
            let source = FileListingSource::new(&args.listings);
            let page = source.fetch_page(args.page, args.per_page).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = std::env::var("HIRESCOPE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            EnvFilter::try_new(&level).with_context(|| format!("invalid log filter '{level}'"))?
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("installing tracing subscriber: {err}"))
}

fn load_facets(path: Option<&PathBuf>) -> Result<FacetStore> {
    let config = match path {
        Some(path) => FacetConfig::load(path)?,
        None => FacetConfig::builtin(),
    };
    Ok(FacetStore::from_config(config)?)
}

/// `--set` assignments are applied as one batch; `--toggle`s follow in order.
fn build_session(facets: FacetStore, sets: &[String], toggles: &[String]) -> Result<FilterSession> {
    let mut session = FilterSession::new(facets);
    let assignments = sets
        .iter()
        .map(|raw| split_assignment(raw))
        .collect::<Result<Vec<_>>>()?;
    session
        .apply_assignments(assignments)
        .with_context(|| format!("applying --set {}", sets.join(" --set ")))?;
    for assignment in toggles {
        let (name, value) = split_assignment(assignment)?;
        session
            .toggle_set_member_by_name(name, value)
            .with_context(|| format!("applying --toggle {assignment}"))?;
    }
    Ok(session)
}

fn split_assignment(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .with_context(|| format!("expected NAME=VALUE, got '{raw}'"))
}
