//! Runs a soil-water balance parameter sweep described by a TOML file.
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use env_logger::{Builder, Target};
use log::{LevelFilter, info};

use soil_water_model::catchment::CatchmentAggregator;
use soil_water_model::config::{PrecipitationConfig, RunConfig};
use soil_water_model::daily_inputs::ClimateTable;
use soil_water_model::precipitation::{
    GaugeSeries, GridPrecipitation, IdwPrecipitation, PrecipitationProvider, stations_from_csv,
};
use soil_water_model::raster_io::{AsciiGridDirectory, DirectoryGridSource, GridSource};
use soil_water_model::results::CsvTableSink;
use soil_water_model::simulation::SimulationRunner;
use soil_water_model::static_params::StaticGrids;
use soil_water_model::sweep::{ParameterSweepRunner, sweep_points};

#[derive(Parser, Debug)]
#[command(name = "soil-water-model", about = "Daily gridded soil-water balance and discharge")]
struct Args {
    /// Run configuration (TOML).
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace); falls back to RUST_LOG.
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(level: Option<&str>) {
    let level = level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .or_else(|| std::env::var("RUST_LOG").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(LevelFilter::Info);
    Builder::new()
        .filter_level(level)
        .target(Target::Stdout)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());

    let config = RunConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    let layout = config.prepare_workspace()?;

    let source = DirectoryGridSource::new(&config.data_dir);
    let mut grids = StaticGrids::load(&source, &config.grids).context("loading static grids")?;
    let mut initial = grids
        .initial_soil_water(&source, config.initial_soil_water.as_deref())
        .context("loading initial soil water")?;
    let aggregator = match &config.catchment.zones {
        Some(name) => {
            let zones = source.load(name)?;
            zones.ensure_shape("catchment zones", grids.shape())?;
            if config.catchment.clip {
                grids = grids.clip_to(&zones);
                initial = initial.extract_by_mask(&zones);
            }
            CatchmentAggregator::zonal(zones, config.catchment.key_field.clone())?
        }
        None => CatchmentAggregator::whole(),
    };

    let climate = ClimateTable::from_csv(&config.climate.table)?;
    info!("{} climate records loaded", climate.len());
    let precipitation: Box<dyn PrecipitationProvider> = match &config.precipitation {
        PrecipitationConfig::Idw {
            stations,
            series,
            interpolation,
        } => Box::new(IdwPrecipitation::new(
            *grids.field_capacity.geometry(),
            stations_from_csv(stations)?,
            GaugeSeries::from_csv(series)?,
            *interpolation,
        )),
        PrecipitationConfig::Grids { dir, prefix } => {
            let dir = dir.clone().unwrap_or_else(|| config.data_dir.clone());
            Box::new(GridPrecipitation::new(DirectoryGridSource::new(dir), prefix.clone()))
        }
    };

    let writer = AsciiGridDirectory::new(&layout.grids);
    let runner = SimulationRunner::new(
        &climate,
        precipitation.as_ref(),
        &aggregator,
        config.start,
        config.end,
    )
    .with_water_runoff(config.water_runoff)
    .with_persistence(config.persist, &writer);

    let points = sweep_points(
        &config.rp_factor.values("rp_factor")?,
        &config.routing_coefficient.values("routing_coefficient")?,
    );
    let sweep = ParameterSweepRunner::new(&grids, &initial, runner, &config.output_name, config.on_failure);
    let summary = sweep.run(&points, |_| Ok(CsvTableSink::new(&layout.tables)))?;

    info!(
        "results written to {} ({} tables)",
        layout.tables.display(),
        summary.completed.len()
    );
    if !summary.failed.is_empty() {
        bail!("{} of {} combinations failed", summary.failed.len(), points.len());
    }
    Ok(())
}
