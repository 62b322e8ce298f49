/*!
Daily precipitation grids.

The water balance only needs "a precipitation grid for day X". Two providers
are available: inverse distance weighting of rain-gauge totals onto the model
grid, and pre-interpolated grids stored next to the static inputs.
*/
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::daily_inputs::DayId;
use crate::error::{ModelError, Result};
use crate::grid::{Grid, GridGeometry};
use crate::raster_io::GridSource;
use crate::table_io;

/// Supplies the interpolated precipitation [mm] of one day on the model grid.
pub trait PrecipitationProvider: Sync {
    fn precipitation(&self, day_id: DayId) -> Result<Grid>;
}

// Rain gauge location
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Station {
    #[serde(rename = "station_id", alias = "Stationsnummer")]
    pub id: u32,
    pub x: f64, // [m], same reference system as the grids
    pub y: f64,
}

// Columns: station_id, x, y
pub fn stations_from_csv(path: &Path) -> Result<Vec<Station>> {
    let rows = table_io::read_rows::<Station>(path)?;
    Ok(rows.into_iter().map(|(_, station)| station).collect())
}

#[derive(Debug, Deserialize)]
struct GaugeRow {
    #[serde(alias = "Stationsnummer")]
    station_id: u32,
    #[serde(alias = "TagesID")]
    day_id: DayId,
    #[serde(alias = "Tagessumme_mm")]
    precip_mm: f64,
}

// Daily totals per gauge
#[derive(Debug, Clone, Default)]
pub struct GaugeSeries {
    by_day: BTreeMap<DayId, Vec<(u32, f64)>>,
}

impl GaugeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, station_id: u32, day_id: DayId, precip_mm: f64) {
        self.by_day.entry(day_id).or_default().push((station_id, precip_mm));
    }

    // Columns: station_id, day_id, precip_mm
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut series = GaugeSeries::new();
        for (_, row) in table_io::read_rows::<GaugeRow>(path)? {
            series.insert(row.station_id, row.day_id, row.precip_mm);
        }
        Ok(series)
    }

    pub fn day(&self, day_id: DayId) -> &[(u32, f64)] {
        self.by_day.get(&day_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

// Search neighbourhood and distance exponent of the interpolation
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct IdwConfig {
    pub power: f64,        // distance exponent
    pub radius: f64,       // fixed search radius [m]
    pub min_points: usize, // radius widens until this many gauges are used
}

impl Default for IdwConfig {
    fn default() -> Self {
        IdwConfig {
            power: 1.0,
            radius: 20_000.0,
            min_points: 5,
        }
    }
}

impl IdwConfig {
    pub fn with_power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_min_points(mut self, min_points: usize) -> Self {
        self.min_points = min_points;
        self
    }
}

const DISTANCE_TOLERANCE: f64 = 1e-9;

// Inverse distance weighting of gauge totals onto a fixed grid
#[derive(Debug, Clone)]
pub struct IdwPrecipitation {
    geometry: GridGeometry,
    stations: HashMap<u32, Station>,
    series: GaugeSeries,
    config: IdwConfig,
}

impl IdwPrecipitation {
    pub fn new(geometry: GridGeometry, stations: Vec<Station>, series: GaugeSeries, config: IdwConfig) -> Self {
        IdwPrecipitation {
            geometry,
            stations: stations.into_iter().map(|s| (s.id, s)).collect(),
            series,
            config,
        }
    }

    /**
    Interpolated value at (x, y) from `(station, value)` samples.

    Uses every sample within `radius`; if fewer than `min_points` lie inside,
    the nearest `min_points` samples are used instead. A point on top of a
    gauge takes that gauge's value.
    */
    pub fn interpolate_at(&self, samples: &[(Station, f64)], x: f64, y: f64) -> f64 {
        let mut by_distance: Vec<(f64, f64)> = samples
            .iter()
            .map(|(s, v)| (((s.x - x).powi(2) + (s.y - y).powi(2)).sqrt(), *v))
            .collect();
        by_distance.sort_by(|a, b| a.0.total_cmp(&b.0));

        let within = by_distance
            .iter()
            .take_while(|(d, _)| *d <= self.config.radius)
            .count();
        let used = within.max(self.config.min_points).min(by_distance.len());

        let mut weighted = 0.0;
        let mut weights = 0.0;
        for &(d, v) in &by_distance[..used] {
            if d < DISTANCE_TOLERANCE {
                return v;
            }
            let w = 1.0 / d.powf(self.config.power);
            weighted += w * v;
            weights += w;
        }
        if weights > 0.0 { weighted / weights } else { f64::NAN }
    }
}

impl PrecipitationProvider for IdwPrecipitation {
    fn precipitation(&self, day_id: DayId) -> Result<Grid> {
        let samples: Vec<(Station, f64)> = self
            .series
            .day(day_id)
            .iter()
            .filter(|(_, v)| !v.is_nan())
            .filter_map(|(id, v)| match self.stations.get(id) {
                Some(station) => Some((*station, *v)),
                None => {
                    debug!("day {day_id}: gauge {id} has no location, ignored");
                    None
                }
            })
            .collect();
        if samples.is_empty() {
            return Err(ModelError::NoPrecipitationData(day_id));
        }

        let g = self.geometry;
        let mut values = Vec::with_capacity(g.cell_count());
        for row in 0..g.nrows {
            for col in 0..g.ncols {
                let (x, y) = g.cell_center(row, col);
                values.push(self.interpolate_at(&samples, x, y));
            }
        }
        Grid::from_row_slice(g, &values)
    }
}

// Precipitation grids named <prefix>_<day_id> in a grid source
#[derive(Debug, Clone)]
pub struct GridPrecipitation<S> {
    source: S,
    prefix: String,
}

impl<S: GridSource> GridPrecipitation<S> {
    pub fn new(source: S, prefix: impl Into<String>) -> Self {
        GridPrecipitation {
            source,
            prefix: prefix.into(),
        }
    }
}

impl<S: GridSource> PrecipitationProvider for GridPrecipitation<S> {
    fn precipitation(&self, day_id: DayId) -> Result<Grid> {
        match self.source.load(&format!("{}_{day_id}", self.prefix)) {
            Err(ModelError::GridNotFound { .. }) => Err(ModelError::NoPrecipitationData(day_id)),
            other => other,
        }
    }
}
