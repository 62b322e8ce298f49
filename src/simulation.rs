// Day loop of one parameter combination
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use serde::Deserialize;

use crate::catchment::CatchmentAggregator;
use crate::daily_inputs::{
    ClimateRecord, ClimateSource, DailyInputs, DayId, date_to_day_id, day_id_to_date, days_between,
};
use crate::error::{ModelError, Result};
use crate::grid::Grid;
use crate::precipitation::PrecipitationProvider;
use crate::raster_io::GridWriter;
use crate::results::{ResultRow, ResultSink};
use crate::runoff::WaterRunoff;
use crate::static_params::StaticParameters;
use crate::water_balance::{DayFluxes, step};

// Which daily grids are written out, named <KIND>_<tag>_<day_id>
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Persistence {
    pub pet: bool,
    pub aet: bool,
    pub precipitation: bool,
    pub runoff: bool,
    pub soil_water: bool,
}

impl Persistence {
    pub fn any(&self) -> bool {
        self.pet || self.aet || self.precipitation || self.runoff || self.soil_water
    }
}

/// Shared flag stopping runs before their next day.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub days_simulated: usize,
    pub missing_days: usize, // calendar days absent from the climate records
    pub cancelled: bool,
}

/**
Runs the water balance over a date range for one set of static parameters.

The runner holds the collaborators shared by every combination of a sweep;
parameters, initial state and result sink are passed per run. Only the soil
water grid is carried from one day to the next.
*/
pub struct SimulationRunner<'a> {
    climate: &'a dyn ClimateSource,
    precipitation: &'a dyn PrecipitationProvider,
    aggregator: &'a CatchmentAggregator,
    start: DayId,
    end: DayId,
    water_runoff: WaterRunoff,
    persistence: Persistence,
    grid_writer: Option<&'a dyn GridWriter>,
    cancel: CancelToken,
}

impl<'a> SimulationRunner<'a> {
    pub fn new(
        climate: &'a dyn ClimateSource,
        precipitation: &'a dyn PrecipitationProvider,
        aggregator: &'a CatchmentAggregator,
        start: DayId,
        end: DayId,
    ) -> Self {
        SimulationRunner {
            climate,
            precipitation,
            aggregator,
            start,
            end,
            water_runoff: WaterRunoff::default(),
            persistence: Persistence::default(),
            grid_writer: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_water_runoff(mut self, mode: WaterRunoff) -> Self {
        self.water_runoff = mode;
        self
    }

    pub fn with_persistence(mut self, persistence: Persistence, writer: &'a dyn GridWriter) -> Self {
        self.persistence = persistence;
        self.grid_writer = Some(writer);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /**
    Simulates every climate record in the date range.

    # Arguments
    - `params` - static parameters of this combination.
    - `initial_soil_water` - soil water before the first day [mm]; copied.
    - `table_base` - result table name, extended per zone in zonal mode.
    - `tag` - infix of persisted grid names, e.g. `rp85_c150`.
    - `sink` - receives one row per day and zone.
    */
    pub fn run(
        &self,
        params: &StaticParameters,
        initial_soil_water: &Grid,
        table_base: &str,
        tag: &str,
        sink: &mut dyn ResultSink,
    ) -> Result<RunSummary> {
        let records = self.climate.records(self.start, self.end)?;
        let missing_days = check_sequence(&records, self.start, self.end)?;
        if let Some(zones) = self.aggregator.zone_grid() {
            zones.ensure_shape("catchment zones", params.shape())?;
        }
        initial_soil_water.ensure_shape("initial soil water", params.shape())?;
        if self.persistence.any() && self.grid_writer.is_none() {
            return Err(ModelError::Config("grid persistence requested without a grid writer".to_string()));
        }

        let tables: Vec<String> = self
            .aggregator
            .zone_keys()
            .into_iter()
            .map(|zone| self.aggregator.table_name(table_base, zone))
            .collect();
        for table in &tables {
            sink.create_table(table)?;
        }

        info!(
            "run {tag}: {} days from {} to {}",
            records.len(),
            self.start,
            self.end
        );
        let mut summary = RunSummary {
            missing_days,
            ..RunSummary::default()
        };
        let mut soil_water = initial_soil_water.clone();
        for record in records {
            if self.cancel.is_cancelled() {
                info!("run {tag} cancelled after {} days", summary.days_simulated);
                summary.cancelled = true;
                return Ok(summary);
            }
            let precipitation = self.precipitation.precipitation(record.day_id)?;
            let fluxes = step(
                &soil_water,
                DailyInputs::new(record, precipitation),
                params,
                self.water_runoff,
            )?;

            let discharge = self.aggregator.discharge(&fluxes.runoff);
            for (table, (_, q)) in tables.iter().zip(&discharge) {
                sink.append(
                    table,
                    &ResultRow {
                        formatted_date: record.formatted_date(),
                        discharge_m3: *q,
                        day_id: record.day_id,
                    },
                )?;
            }
            self.persist(&fluxes, tag, record.day_id)?;
            debug!("run {tag}: day {} done, Q = {:?}", record.day_id, discharge);

            soil_water = fluxes.soil_water;
            summary.days_simulated += 1;
        }
        info!("run {tag} finished: {} days", summary.days_simulated);
        Ok(summary)
    }

    fn persist(&self, fluxes: &DayFluxes, tag: &str, day_id: DayId) -> Result<()> {
        let Some(writer) = self.grid_writer else {
            return Ok(());
        };
        let p = self.persistence;
        let kinds = [
            ("PET", p.pet, &fluxes.pet),
            ("AET", p.aet, &fluxes.aet),
            ("P", p.precipitation, &fluxes.precipitation),
            ("R", p.runoff, &fluxes.runoff),
            ("S", p.soil_water, &fluxes.soil_water),
        ];
        for (kind, enabled, grid) in kinds {
            if enabled {
                writer.write(&format!("{kind}_{tag}_{day_id}"), grid)?;
            }
        }
        Ok(())
    }
}

/*
Rejects unordered or repeated days and logs every gap, including those before
the first and after the last record of `start..=end`. Returns the number of
days without a record.
*/
fn check_sequence(records: &[ClimateRecord], start: DayId, end: DayId) -> Result<usize> {
    for pair in records.windows(2) {
        let (previous, current) = (pair[0].day_id, pair[1].day_id);
        if current <= previous {
            return Err(ModelError::UnorderedRecords { previous, current });
        }
    }
    let (first, last) = (day_id_to_date(start)?, day_id_to_date(end)?);
    if first > last {
        return Ok(0);
    }
    // the days just outside the range bound the leading and trailing gaps
    let before = first.pred_opt().ok_or(ModelError::InvalidDayId(start))?;
    let after = last.succ_opt().ok_or(ModelError::InvalidDayId(end))?;
    let bounds: Vec<DayId> = std::iter::once(date_to_day_id(before))
        .chain(records.iter().map(|r| r.day_id))
        .chain(std::iter::once(date_to_day_id(after)))
        .collect();

    let mut missing = 0;
    for pair in bounds.windows(2) {
        let gap = days_between(pair[0], pair[1])?;
        if let (Some(from), Some(to)) = (gap.first(), gap.last()) {
            warn!("no climate record for {} day(s) from {from} to {to}", gap.len());
            missing += gap.len();
        }
    }
    Ok(missing)
}
