use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate, generate_to};

use crate::page::{DEFAULT_ATTRIBUTION, DEFAULT_TILE_URL, DEFAULT_ZOOM};

pub const DEFAULT_DATASET_PATH: &str = "neh_1960s_grants.geojson";
pub const DEFAULT_MAP_PATH: &str = "data/output/grant_map.html";
pub const DEFAULT_CSV_PATH: &str = "data/output/grants.csv";
pub const DEFAULT_TITLE: &str = "NEH Grants of the 1960s";

pub const DATASET_HELP: &str = "GeoJSON FeatureCollection of grant points to plot. Accepts a local path or an http(s):// URL (defaults to neh_1960s_grants.geojson).";
pub const OUTPUT_HELP: &str =
    "Write the rendered map page to the given HTML file (defaults to data/output/grant_map.html).";
pub const SAVE_CSV_HELP: &str = "Also export the normalized grants to the given CSV file (defaults to data/output/grants.csv when no path is provided).";
pub const CENTER_HELP: &str =
    "Initial map center as LAT,LON (defaults to 37.90,-94.66, a continental US view).";

#[derive(Debug, Parser)]
#[command(
    name = "grantmap",
    about = "Render a GeoJSON collection of NEH grant awards as an interactive Leaflet map with per-grant popups.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    #[arg(value_name = "DATASET", default_value = DEFAULT_DATASET_PATH, help = DATASET_HELP)]
    pub dataset: String,
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = DEFAULT_MAP_PATH,
        help = OUTPUT_HELP
    )]
    pub output: PathBuf,
    #[arg(
        long,
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = DEFAULT_CSV_PATH,
        help = SAVE_CSV_HELP
    )]
    pub save_csv: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_TITLE, help = "Page title shown in the overlay panel.")]
    pub title: String,
    #[arg(long, value_name = "LAT,LON", value_parser = parse_center, help = CENTER_HELP)]
    pub center: Option<(f64, f64)>,
    #[arg(long, default_value_t = DEFAULT_ZOOM, help = "Initial zoom level.")]
    pub zoom: u8,
    #[arg(
        long,
        value_name = "URL",
        default_value = DEFAULT_TILE_URL,
        help = "Tile URL template for the base layer."
    )]
    pub tile_url: String,
    #[arg(
        long,
        default_value = DEFAULT_ATTRIBUTION,
        help = "Attribution markup for the base tile layer."
    )]
    pub attribution: String,
    #[arg(
        long,
        help = "Print every grant row in the terminal summary instead of the abbreviated table."
    )]
    pub full_output: bool,
    #[arg(long, help = "Disable progress spinner output.")]
    pub no_progress: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

fn parse_center(raw: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{raw}'"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| format!("invalid latitude '{lat}'"))?;
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| format!("invalid longitude '{lon}'"))?;
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("latitude {lat} is out of range"));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("longitude {lon} is out of range"));
    }
    Ok((lat, lon))
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate shell completion scripts, optionally installing them for the current user.
    Completions {
        #[arg(value_enum, help = "Shell to generate completions for.")]
        shell: Shell,
        #[arg(
            long,
            value_name = "DIR",
            help = "Directory to write the completion script to."
        )]
        output_dir: Option<PathBuf>,
        #[arg(
            long,
            help = "Install the completion script into the default location for the selected shell."
        )]
        install: bool,
    },
}

pub fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Completions {
            shell,
            output_dir,
            install,
        } => generate_completions(shell, output_dir, install),
    }
}

fn generate_completions(shell: Shell, output_dir: Option<PathBuf>, install: bool) -> Result<()> {
    let mut command = Cli::command();
    let bin_name = command.get_name().to_string();

    let target_dir = if let Some(dir) = output_dir {
        Some(dir)
    } else if install {
        Some(default_install_dir(shell)?)
    } else {
        None
    };

    if let Some(dir) = target_dir {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create completion directory {}", dir.display()))?;
        let path = generate_to(shell, &mut command, bin_name, &dir)
            .context("failed to write completion file")?;
        println!("Installed {shell:?} completions to {}", path.display());
    } else {
        let mut stdout = io::stdout().lock();
        generate(shell, &mut command, bin_name, &mut stdout);
        stdout
            .flush()
            .context("failed to flush completion output")?;
    }

    Ok(())
}

fn default_install_dir(shell: Shell) -> Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| {
        anyhow!("HOME environment variable is not set; use --output-dir to specify a path")
    })?;
    let mut path = PathBuf::from(home);

    match shell {
        Shell::Bash => {
            path.push(".local/share/bash-completion/completions");
            Ok(path)
        }
        Shell::Elvish => {
            path.push(".elvish/lib/completions");
            Ok(path)
        }
        Shell::Fish => {
            path.push(".config/fish/completions");
            Ok(path)
        }
        Shell::PowerShell => {
            path.push(".local/share/powershell/Scripts");
            Ok(path)
        }
        Shell::Zsh => {
            path.push(".local/share/zsh/site-functions");
            Ok(path)
        }
        other => Err(anyhow!(
            "no default install location for {other:?}; specify --output-dir"
        )),
    }
}
