use crate::cli::Cli;
use crate::dataset::load_grants;
use crate::grants::{Grant, NormalizedGrant};
use crate::page::{MapPageContext, MapView, MarkerData, save_map_page};
use crate::popup::{build_popup_html, format_usd};
use crate::progress::{ProgressState, Stage, run_stage};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use colored::Colorize;
use csv::Writer;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

mod cli;
mod dataset;
mod grants;
mod page;
mod popup;
mod progress;

const HTTP_TIMEOUT_SECONDS: u64 = 20;
const SUMMARY_ROW_LIMIT: usize = 10;

#[tokio::main]
async fn main() -> Result<()> {
    colored::control::set_override(true);

    let mut cli = Cli::parse();

    if let Some(command) = cli.command.take() {
        crate::cli::handle_command(command)?;
        return Ok(());
    }

    let run_started_at = Local::now();
    let progress = (!cli.no_progress).then(|| ProgressState::new(true));

    let client = Client::builder()
        .user_agent("grantmap/0.1")
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECONDS))
        .build()
        .context("failed to build HTTP client")?;

    let grants = run_stage(
        progress.as_ref(),
        Stage::Fetch,
        &cli.dataset,
        load_grants(&client, &cli.dataset),
    )
    .await?;

    let normalized: Vec<NormalizedGrant> = grants.into_iter().map(Grant::normalize).collect();
    let markers = build_markers(&normalized);

    let mut view = MapView::default();
    if let Some(center) = cli.center {
        view.center = center;
    }
    view.zoom = cli.zoom;
    view.tile_url = cli.tile_url.clone();
    view.attribution = cli.attribution.clone();

    let page_context = MapPageContext {
        title: &cli.title,
        source: &cli.dataset,
        generated_at: &run_started_at,
        view: &view,
        markers: &markers,
    };
    let output_label = cli.output.display().to_string();
    run_stage(
        progress.as_ref(),
        Stage::Render,
        &output_label,
        save_map_page(&cli.output, &page_context),
    )
    .await?;

    if let Some(path) = cli.save_csv.as_ref() {
        save_grants_csv(&normalized, path.as_path()).await?;
    }

    if let Some(progress) = progress.as_ref() {
        progress.clear();
    }

    print_summary(&SummaryContext {
        dataset: &cli.dataset,
        grant_count: normalized.len(),
        total_awarded: normalized.iter().map(|grant| grant.award_outright).sum(),
        run_started_at: &run_started_at,
        paths: SummaryPaths {
            map: cli.output.as_path(),
            csv: cli.save_csv.as_deref(),
        },
        grants: &normalized,
        full_output: cli.full_output,
    });

    Ok(())
}

fn build_markers(grants: &[NormalizedGrant]) -> Vec<MarkerData> {
    grants
        .iter()
        .map(|grant| MarkerData {
            lat: grant.lat,
            lon: grant.lon,
            popup: build_popup_html(grant),
        })
        .collect()
}

struct SummaryPaths<'a> {
    map: &'a Path,
    csv: Option<&'a Path>,
}

struct SummaryContext<'a> {
    dataset: &'a str,
    grant_count: usize,
    total_awarded: f64,
    run_started_at: &'a DateTime<Local>,
    paths: SummaryPaths<'a>,
    grants: &'a [NormalizedGrant],
    full_output: bool,
}

fn print_summary(context: &SummaryContext<'_>) {
    println!();
    print_summary_header(context);
    print_summary_paths(&context.paths);
    println!();
    println!("{}", "Grant Awards".bold().bright_magenta());
    let table_width = print_grant_table(context.grants, context.full_output);
    if table_width > 0 {
        let divider = "=".repeat(table_width);
        println!("{}", divider.bright_cyan());
    }
}

fn print_summary_header(context: &SummaryContext<'_>) {
    println!(
        "{}",
        "====================== GrantMap Render ======================"
            .bold()
            .bright_cyan()
    );
    println!(
        "{} {}",
        "Run started".bright_yellow().bold(),
        context
            .run_started_at
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string()
            .bright_white()
    );
    println!(
        "{} {} | {} | {}",
        "Dataset".bright_yellow().bold(),
        context.dataset.bright_white(),
        format!("Grants: {}", context.grant_count).bright_white(),
        format!("Total awarded: {}", format_usd(context.total_awarded)).bright_white()
    );
}

fn print_summary_paths(paths: &SummaryPaths<'_>) {
    print_path_line("Map HTML", Some(paths.map), "");
    print_path_line("Grants CSV", paths.csv, "not saved (use --save-csv)");
}

fn print_path_line(label: &str, path: Option<&Path>, hint: &str) {
    let label_colored = label.bright_yellow().bold();
    match path {
        Some(path) => println!(
            "{} {}",
            label_colored,
            format!("{}", path.display()).bright_white()
        ),
        None => println!("{} {}", label_colored, hint.bright_black()),
    }
}

fn print_grant_table(grants: &[NormalizedGrant], full_output: bool) -> usize {
    if grants.is_empty() {
        let message = "No grants in the dataset.";
        println!("{}", message.bright_black());
        return message.len();
    }

    let header = format!(
        "{:>4} | {:<34} | {:<18} | {:<2} | {:>14}",
        "Year", "Institution", "City", "ST", "Award"
    );
    let separator =
        "-----+------------------------------------+--------------------+----+---------------";
    let mut max_width = header.len().max(separator.len());
    println!("{}", header.bold().bright_white());
    println!("{}", separator.bright_black());

    let shown = if full_output {
        grants.len()
    } else {
        grants.len().min(SUMMARY_ROW_LIMIT)
    };
    for grant in &grants[..shown] {
        let line = format!(
            "{:>4} | {:<34.34} | {:<18.18} | {:<2.2} | {:>14}",
            grant.year_awarded,
            grant.institution,
            grant.inst_city,
            grant.inst_state,
            format_usd(grant.award_outright)
        );
        max_width = max_width.max(line.len());
        println!("{}", line.bright_green());
    }

    if grants.len() > shown {
        let message = format!(
            "... {} more entries (use --full-output to display all).",
            grants.len() - shown
        );
        max_width = max_width.max(message.len());
        println!("{}", message.bright_black());
    }

    max_width
}

pub(crate) async fn write_output_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(())
}

fn finalize_writer(mut writer: Writer<Vec<u8>>, label: &str) -> Result<Vec<u8>> {
    writer
        .flush()
        .with_context(|| format!("failed to flush {label}"))?;
    writer
        .into_inner()
        .with_context(|| format!("failed to finalize {label}"))
}

async fn save_grants_csv(grants: &[NormalizedGrant], path: &Path) -> Result<()> {
    let mut writer = Writer::from_writer(Vec::new());
    for grant in grants {
        writer
            .serialize(grant)
            .context("failed to serialize grant record")?;
    }
    let serialized = finalize_writer(writer, "grant CSV writer")?;
    write_output_file(path, &serialized).await
}
