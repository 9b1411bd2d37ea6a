use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use pricenick_core::{
    config::{self, IntegrationsFile},
    integration,
    model::{Catalog, MergedModel},
    CatalogCache, HealthStatus, IntegrationRegistry, TokenPrice,
};
use tracing_subscriber::EnvFilter;

// ── Palette ──────────────────────────────────────────────────────────

fn s_header() -> Style { Style::new().color256(252).bold() }  // bright gray, bold
fn s_dim() -> Style    { Style::new().color256(248) }         // light gray
fn s_tree() -> Style   { Style::new().color256(245) }         // mid gray
fn s_hint() -> Style   { Style::new().color256(243) }         // soft gray
fn s_hot() -> Style    { Style::new().color256(114) }         // green
fn s_warm() -> Style   { Style::new().color256(214) }         // amber
fn s_err() -> Style    { Style::new().color256(167) }         // red
fn s_price() -> Style  { Style::new().color256(109) }         // teal
fn s_bold() -> Style   { Style::new().bold() }
fn s_param() -> Style  { Style::new().color256(139) }         // mauve

fn sep(width: usize) -> String {
    s_tree().apply_to("\u{2500}".repeat(width)).to_string()
}

fn health_str(h: &HealthStatus) -> String {
    let style = match h {
        HealthStatus::Available => s_hot(),
        HealthStatus::Failed(_) => s_warm(),
        HealthStatus::Unavailable(_) => s_err(),
        HealthStatus::Uninitialized | HealthStatus::Disabled => s_hint(),
    };
    style.apply_to(h.to_string()).to_string()
}

fn fmt_price(v: f64) -> String {
    if v == 0.0 {
        "free".to_string()
    } else if v < 0.01 {
        format!("{v:.4}")
    } else {
        format!("{v:.2}")
    }
}

fn fmt_tokens(t: &TokenPrice) -> (String, String) {
    (
        format!("{} {}", fmt_price(t.input), t.unit),
        format!("{} {}", fmt_price(t.output), t.unit),
    )
}

fn header_cell(s: &str) -> Cell {
    Cell::new(s).fg(Color::AnsiValue(243))
}

// ── CLI Args ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "pricenick",
    about = "Compare LLM token prices across API providers and pick the cheapest offer",
    version,
    after_help = "examples:\n  \
        pricenick                               (every model, cheapest offer first)\n  \
        pricenick models --brand deepseek\n  \
        pricenick models --provider dmx --json\n  \
        pricenick model claude-4-sonnet          (all offers, ranked)\n  \
        pricenick brands\n  \
        pricenick providers                     (provider health)\n  \
        pricenick --disable dmx models"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Integrations file (default: user config dir, else bundled)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Disable a provider for this run; repeatable
    #[arg(long, global = true, value_name = "KEY")]
    disable: Vec<String>,

    /// Log discovery and fetch progress to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merged catalog with the recommended provider per model.
    Models {
        #[arg(long, short)]
        brand: Option<String>,
        #[arg(long, short)]
        provider: Option<String>,
    },
    /// One model with every offer, cheapest first.
    Model {
        /// Model name, case-insensitive, e.g. deepseek-v3.1
        name: String,
    },
    /// Brands in the catalog.
    Brands,
    /// Configured providers and their health after a fetch.
    Providers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let file = load_config(cli.config.as_deref())?;
    let registry = IntegrationRegistry::discover(&file, &integration::builtin());
    for key in &cli.disable {
        registry.set_enabled(key, false)?;
    }
    let cache = CatalogCache::new(Arc::new(registry));

    match cli.command {
        Some(Commands::Models { brand, provider }) => {
            cmd_models(&cache, brand.as_deref(), provider.as_deref(), cli.json).await?;
        }
        Some(Commands::Model { name }) => {
            cmd_model(&cache, &name, cli.json).await?;
        }
        Some(Commands::Brands) => {
            cmd_brands(&cache, cli.json).await?;
        }
        Some(Commands::Providers) => {
            cmd_providers(&cache, cli.json).await?;
        }
        None => {
            cmd_models(&cache, None, None, cli.json).await?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info,pricenick_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<IntegrationsFile> {
    tracing::debug!(path = ?path, "loading integrations");
    match path {
        Some(p) => Ok(config::load_integrations(p)?),
        None => Ok(config::load_integrations_user()?),
    }
}

/// Run (or reuse) a fetch cycle behind a transient stderr status line.
async fn load_catalog(cache: &CatalogCache) -> anyhow::Result<Arc<Catalog>> {
    let term = Term::stderr();
    term.write_line(&format!("{}", s_dim().apply_to("fetching prices...")))?;
    let result = cache.get().await;
    term.clear_last_lines(1)?;
    Ok(result?)
}

fn footer(catalog: &Catalog, what: String) {
    let at = catalog.fetched_at.with_timezone(&chrono::Local);
    println!(
        "{}",
        s_hint().apply_to(format!(
            "  {what}   cycle {} at {}",
            catalog.cycle,
            at.format("%H:%M:%S")
        ))
    );
}

// ── Models ───────────────────────────────────────────────────────────

async fn cmd_models(
    cache: &CatalogCache,
    brand: Option<&str>,
    provider: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let catalog = load_catalog(cache).await?;

    let mut models: Vec<&MergedModel> = match brand {
        Some(b) => catalog.by_brand(b),
        None => catalog.models.iter().collect(),
    };
    if let Some(p) = provider {
        models.retain(|m| m.offered_by(p));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!();
    if models.is_empty() {
        println!("  {}", s_dim().apply_to("no models match"));
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        header_cell("  Brand"),
        header_cell("Model"),
        header_cell("Size"),
        header_cell("Window"),
        header_cell("Best"),
        header_cell("Input/M"),
        header_cell("Output/M"),
        header_cell("Offers"),
    ]);

    for m in &models {
        let best = m.recommended();
        let (input, output) = best.map(|o| fmt_tokens(&o.tokens)).unwrap_or_default();
        table.add_row(vec![
            Cell::new(format!("  {}", m.brand)).fg(Color::AnsiValue(248)),
            Cell::new(&m.name).fg(Color::AnsiValue(252)),
            Cell::new(m.data_amount.map(MergedModel::fmt_data_amount).unwrap_or_default())
                .fg(Color::AnsiValue(139)),
            Cell::new(MergedModel::fmt_window(m.window)).fg(Color::AnsiValue(248)),
            Cell::new(&m.recommended_provider).fg(Color::AnsiValue(114)),
            Cell::new(input).fg(Color::AnsiValue(109)),
            Cell::new(output).fg(Color::AnsiValue(109)),
            Cell::new(m.providers.len()).fg(Color::AnsiValue(243)),
        ]);
    }
    println!("{table}");

    println!("{}", sep(72));
    footer(
        &catalog,
        format!("{} models   pricenick model <name> for all offers", models.len()),
    );
    println!();
    Ok(())
}

// ── Model detail ─────────────────────────────────────────────────────

async fn cmd_model(cache: &CatalogCache, name: &str, json: bool) -> anyhow::Result<()> {
    let catalog = load_catalog(cache).await?;
    let found = catalog.find(name);
    if found.is_empty() {
        anyhow::bail!("no model named '{name}' (try: pricenick models)");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    for m in found {
        println!();
        let size = m
            .data_amount
            .map(|b| format!("  {}", s_param().apply_to(MergedModel::fmt_data_amount(b))))
            .unwrap_or_default();
        println!(
            "{}  {}{}  {}",
            s_bold().apply_to(&m.name),
            s_dim().apply_to(&m.brand),
            size,
            s_dim().apply_to(format!("{} ctx", MergedModel::fmt_window(m.window)))
        );
        println!("{}", sep(64));

        let mut table = Table::new();
        table.load_preset(presets::NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            header_cell("  Provider"),
            header_cell("Input/M"),
            header_cell("Output/M"),
            header_cell("Website"),
        ]);
        for offer in m.ranked_offers() {
            let best = offer.provider == m.recommended_provider;
            let marker = if best { "\u{25cf}" } else { " " };
            let (input, output) = fmt_tokens(&offer.tokens);
            table.add_row(vec![
                Cell::new(format!("{marker} {}", offer.display_name))
                    .fg(Color::AnsiValue(if best { 114 } else { 252 })),
                Cell::new(input).fg(Color::AnsiValue(109)),
                Cell::new(output).fg(Color::AnsiValue(109)),
                Cell::new(&offer.website).fg(Color::AnsiValue(243)),
            ]);
        }
        println!("{table}");
    }

    println!("{}", sep(64));
    footer(&catalog, format!("{} recommended", s_hot().apply_to("\u{25cf}")));
    println!();
    Ok(())
}

// ── Brands ───────────────────────────────────────────────────────────

async fn cmd_brands(cache: &CatalogCache, json: bool) -> anyhow::Result<()> {
    let catalog = load_catalog(cache).await?;
    let counts: Vec<(&str, usize)> = catalog
        .brands()
        .into_iter()
        .map(|b| (b, catalog.by_brand(b).len()))
        .collect();

    if json {
        let obj: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(b, n)| (b.to_string(), serde_json::Value::from(*n)))
            .collect();
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    println!();
    println!("{}", s_header().apply_to("brands"));
    println!("{}", sep(40));
    for (brand, n) in &counts {
        println!(
            "  {:<24} {}",
            s_bold().apply_to(brand),
            s_dim().apply_to(format!("{n} models"))
        );
    }
    println!("{}", sep(40));
    footer(
        &catalog,
        format!("{} brands   pricenick models --brand <name>", counts.len()),
    );
    println!();
    Ok(())
}

// ── Providers ────────────────────────────────────────────────────────

async fn cmd_providers(cache: &CatalogCache, json: bool) -> anyhow::Result<()> {
    // Health is only meaningful after a cycle; a total failure still has a report.
    let outcome = load_catalog(cache).await;
    let registry = cache.registry();
    let health = registry.health();

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    let descriptors = registry.descriptors();
    println!();
    println!("{}", s_header().apply_to("providers"));
    println!("{}", sep(64));
    for (h, d) in health.iter().zip(&descriptors) {
        let reason = match &h.status {
            HealthStatus::Unavailable(r) | HealthStatus::Failed(r) => r.as_str(),
            _ => "",
        };
        println!(
            "  {:<12} {:<14} {:<16} {}",
            s_bold().apply_to(&h.key),
            s_dim().apply_to(&h.display_name),
            health_str(&h.status),
            s_hint().apply_to(reason)
        );
        println!(
            "  {:<12} {}",
            "",
            s_price().apply_to(format!("{}  timeout {}s", d.website, d.timeout.as_secs()))
        );
    }
    for e in registry.excluded() {
        println!("  {}", s_err().apply_to(format!("\u{2717} excluded: {e}")));
    }
    println!("{}", sep(64));

    match outcome {
        Ok(catalog) => {
            let active = registry.active_providers().len();
            footer(
                &catalog,
                format!("{active}/{} providers active", health.len()),
            );
        }
        Err(e) => println!("  {}", s_err().apply_to(e)),
    }
    println!();
    Ok(())
}
