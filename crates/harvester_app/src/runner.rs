//! Wires one retailer's profile into discovery, a strategy and the engine,
//! then hands the finished session to the sink.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use engine_logging::{engine_error, engine_info, engine_warn};
use harvester_engine::{
    finalize, ApiPaginatedStrategy, ArtifactLayout, AtomicFileWriter, CategoryDiscovery, CategoryTree,
    EmbeddedJsonStrategy, EngineSettings, ExtractionStrategy, Fetcher, HarvestContext, HarvestEngine,
    LogProgressSink, PaginationDiscovery, PersistedArtifact, ReqwestFetcher, SinkOptions, UnitArtifactWriter,
    WorkDiscovery,
};

use crate::config::{Config, RetailerConfig};
use crate::persistence::{load_run_state, save_run_state};
use crate::profiles::{self, MenuSource, RetailerProfile, StrategyProfile};

const PROGRESS_EVERY: usize = 25;

/// Runs the selected retailers one after another. A failed retailer does not
/// stop the others; the command fails if any of them did.
pub async fn run(config: &Config, names: &[String], output: Option<PathBuf>) -> anyhow::Result<()> {
    let retailers = config.select(names)?;
    let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
    let fetcher: Arc<dyn Fetcher> =
        Arc::new(ReqwestFetcher::new(config.fetch.settings()).context("building HTTP client")?);
    let mut state = load_run_state(&config.state_file);

    let mut failed = Vec::new();
    for retailer in &retailers {
        if let Some(last) = state.last_run(&retailer.name) {
            engine_info!(
                "[{}] last successful run finished {} with {} records, {} failed units",
                retailer.name,
                last.finished_at,
                last.record_count,
                last.failed_units.len()
            );
        }
        match harvest_retailer(config, retailer, Arc::clone(&fetcher), &output_dir).await {
            Ok(artifact) => {
                state.record(&retailer.name, &artifact, Utc::now());
                save_run_state(&config.state_file, &state);
            }
            Err(err) => {
                engine_error!("[{}] run failed: {:#}", retailer.name, err);
                failed.push(retailer.name.clone());
            }
        }
    }

    if !failed.is_empty() {
        bail!("{} of {} retailer runs failed: {}", failed.len(), retailers.len(), failed.join(", "));
    }
    Ok(())
}

async fn harvest_retailer(
    config: &Config,
    retailer: &RetailerConfig,
    fetcher: Arc<dyn Fetcher>,
    output_dir: &Path,
) -> anyhow::Result<PersistedArtifact> {
    let profile = profiles::builtin(&retailer.name).ok_or_else(|| anyhow!("unknown retailer {:?}", retailer.name))?;
    let name = profile.name;
    let ctx = HarvestContext::new(name, Arc::clone(&fetcher), profile.request.clone(), config.retry.policy());

    let (discovery, strategy, layout) = build_plan(&profile, retailer, ctx, &fetcher, config).await?;
    let writer = AtomicFileWriter::new(output_dir.to_path_buf());
    let strategy: Arc<dyn ExtractionStrategy> = match layout {
        ArtifactLayout::PerUnit => Arc::new(UnitArtifactWriter::new(strategy, writer.clone(), name)),
        ArtifactLayout::Merged => strategy,
    };

    let units = discovery
        .discover()
        .await
        .with_context(|| format!("[{name}] work discovery failed"))?;

    let settings = EngineSettings {
        concurrency: retailer.concurrency.unwrap_or(profile.concurrency),
        deadline: config.deadline(),
    };
    let engine = HarvestEngine::new(name, settings);
    let session = engine
        .run(units, strategy, &LogProgressSink::new(name, PROGRESS_EVERY))
        .await;

    let view = session.view();
    engine_info!(
        "[{}] {}/{} units done, {} records, {} failed",
        name,
        view.completed,
        view.total,
        view.record_count,
        view.failed_count()
    );
    if view.failed_count() > 0 {
        engine_info!("[{}] failed units: {}", name, view.failed_list());
    }

    let options = SinkOptions {
        retailer: name.to_string(),
        layout,
        dedupe_key: retailer.dedupe_key.clone(),
    };
    let artifact = finalize(session, &writer, &options)?;
    for path in &artifact.paths {
        engine_info!("[{}] wrote {:?}", name, path);
    }
    Ok(artifact)
}

type Plan = (Box<dyn WorkDiscovery>, Arc<dyn ExtractionStrategy>, ArtifactLayout);

async fn build_plan(
    profile: &RetailerProfile,
    retailer: &RetailerConfig,
    ctx: HarvestContext,
    fetcher: &Arc<dyn Fetcher>,
    config: &Config,
) -> anyhow::Result<Plan> {
    let name = profile.name;
    match &profile.strategy {
        StrategyProfile::ApiPaginated(api) => {
            let discovery = category_discovery(profile, retailer, fetcher, config).await?;
            let plan: Plan = (
                Box::new(discovery),
                Arc::new(ApiPaginatedStrategy::new(ctx, api.clone())),
                ArtifactLayout::Merged,
            );
            Ok(plan)
        }
        StrategyProfile::EmbeddedJson {
            profile: embedded,
            pagination_selector,
        } => {
            let discovery = PaginationDiscovery::new(ctx.clone(), &embedded.listing_url, pagination_selector);
            let strategy = EmbeddedJsonStrategy::new(ctx, embedded.clone())
                .with_context(|| format!("[{name}] invalid listing profile"))?;
            let plan: Plan = (Box::new(discovery), Arc::new(strategy), ArtifactLayout::Merged);
            Ok(plan)
        }
        StrategyProfile::Browser(browser) => {
            let discovery = category_discovery(profile, retailer, fetcher, config).await?;
            let plan: Plan = (
                Box::new(discovery),
                browser_strategy(name, browser.clone())?,
                ArtifactLayout::PerUnit,
            );
            Ok(plan)
        }
    }
}

#[cfg(feature = "browser")]
fn browser_strategy(
    name: &str,
    profile: harvester_engine::BrowserProfile,
) -> anyhow::Result<Arc<dyn ExtractionStrategy>> {
    use harvester_engine::{BrowserStrategy, ChromiumLauncher};

    let launcher = Arc::new(ChromiumLauncher::default());
    Ok(Arc::new(BrowserStrategy::new(name, launcher, profile)))
}

#[cfg(not(feature = "browser"))]
fn browser_strategy(
    name: &str,
    _profile: harvester_engine::BrowserProfile,
) -> anyhow::Result<Arc<dyn ExtractionStrategy>> {
    bail!("[{name}] needs a browser, but this binary was built without the `browser` feature")
}

fn menu_source<'a>(profile: &'a RetailerProfile) -> anyhow::Result<&'a MenuSource> {
    profile
        .menu
        .as_ref()
        .ok_or_else(|| anyhow!("[{}] is not category based", profile.name))
}

/// Category tree from the stored menu file, or the live menu when no file
/// has been stored yet.
async fn category_discovery(
    profile: &RetailerProfile,
    retailer: &RetailerConfig,
    fetcher: &Arc<dyn Fetcher>,
    config: &Config,
) -> anyhow::Result<CategoryDiscovery> {
    let menu = menu_source(profile)?;
    let file = retailer
        .categories_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(menu.default_file));

    let tree = if file.exists() {
        engine_info!("[{}] loading categories from {:?}", profile.name, file);
        CategoryTree::load(&file).with_context(|| format!("loading {}", file.display()))?
    } else {
        engine_warn!("[{}] {:?} not found; fetching the live menu", profile.name, file);
        let ctx = HarvestContext::new(
            profile.name,
            Arc::clone(fetcher),
            menu.request.clone(),
            config.retry.policy(),
        );
        let (tree, _) = CategoryTree::fetch(&ctx, menu.url).await?;
        tree
    };

    let top_level = retailer
        .top_level_categories
        .clone()
        .unwrap_or_else(|| menu.default_top_level.clone());
    Ok(CategoryDiscovery::new(profile.name, &tree, &top_level, menu.depth))
}

/// Fetches a retailer's live menu and stores the raw JSON for later runs.
pub async fn fetch_menu(config: &Config, name: &str, out: Option<PathBuf>) -> anyhow::Result<()> {
    let retailer = config
        .select(&[name.to_string()])?
        .pop()
        .ok_or_else(|| anyhow!("unknown retailer {name:?}"))?;
    let profile = profiles::builtin(&retailer.name).ok_or_else(|| anyhow!("unknown retailer {name:?}"))?;
    let menu = menu_source(&profile)?;
    let out = out
        .or(retailer.categories_file)
        .unwrap_or_else(|| PathBuf::from(menu.default_file));

    let fetcher: Arc<dyn Fetcher> =
        Arc::new(ReqwestFetcher::new(config.fetch.settings()).context("building HTTP client")?);
    let ctx = HarvestContext::new(profile.name, fetcher, menu.request.clone(), config.retry.policy());
    let (tree, raw) = CategoryTree::fetch(&ctx, menu.url)
        .await
        .with_context(|| format!("[{}] fetching menu", profile.name))?;

    let filename = out
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| anyhow!("{} has no file name", out.display()))?;
    let dir = match out.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let path = AtomicFileWriter::new(dir).write_json(filename, &raw)?;
    engine_info!("[{}] stored menu with {} category rows at {:?}", profile.name, tree.rows().len(), path);
    Ok(())
}

pub fn list_retailers() {
    for name in profiles::BUILTIN_NAMES {
        if let Some(profile) = profiles::builtin(name) {
            let kind = match profile.strategy {
                StrategyProfile::ApiPaginated(_) => "paginated API",
                StrategyProfile::EmbeddedJson { .. } => "embedded listing JSON",
                StrategyProfile::Browser(_) => "headless browser",
            };
            println!("{name:<20} {kind:<22} {} workers", profile.concurrency);
        }
    }
}
