mod config;
mod data;
mod errors;
mod etl;

use std::io;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::info;
use structured_logger::json::new_writer;
use structured_logger::Builder;

use crate::config::{load_user_config, UserConfig};
use crate::errors::Result;
use crate::etl::audit::AuditEtl;
use crate::etl::clean_osm::CleanOsmEtl;
use crate::etl::shape_osm::ShapeOsmEtl;
use crate::etl::Etl;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Report unexpected street types and postal codes.
    Audit,
    /// Write a copy of the document with normalized values.
    Clean,
    /// Write the CSV row sets.
    Shape,
    All,
}

/// Turns an OpenStreetMap XML extract into CSV tables ready for bulk loading.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON configuration file.
    #[arg(short, long, default_value = "config/osm_tabular.json")]
    config: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Stage::All)]
    stage: Stage,

    /// Rebuild outputs even when they already exist.
    #[arg(short, long)]
    force: bool,
}

fn setup_logging(level: &str) {
    Builder::with_level(level)
        .with_target_writer("*", new_writer(io::stdout()))
        .init();
}

fn run_stage<E: Etl>(mut etl: E, config: &UserConfig, force: bool) -> Result<()> {
    if force {
        etl.clean(&config.dest_path)?;
    }
    etl.process(&config.dest_path)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let user_config = load_user_config(&args.config)?;
    setup_logging(&user_config.log_level);

    info!(
        config = args.config.display().to_string().as_str(),
        data_path = user_config.data_path.display().to_string().as_str();
        "Loaded configuration"
    );

    if matches!(args.stage, Stage::Audit | Stage::All) {
        run_stage(AuditEtl::new(&user_config), &user_config, args.force)?;
    }
    if matches!(args.stage, Stage::Clean | Stage::All) {
        run_stage(CleanOsmEtl::new(&user_config), &user_config, args.force)?;
    }
    if matches!(args.stage, Stage::Shape | Stage::All) {
        run_stage(ShapeOsmEtl::new(&user_config), &user_config, args.force)?;
    }
    Ok(())
}
