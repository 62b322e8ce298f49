//! One day of the cell water balance.
//!
//! Given yesterday's soil water, today's inputs and the run's static
//! parameters, computes PET, AET, runoff and today's soil water:
//!
//! `S_new = S_prev + P - AET - R`
//!
//! No clamping is applied to `S_new`; it may leave `[0, FK]` when the inputs
//! are inconsistent.
use crate::daily_inputs::DailyInputs;
use crate::error::{ModelError, Result};
use crate::evapotranspiration::{actual_et, potential_et};
use crate::grid::Grid;
use crate::runoff::{WaterRunoff, total_runoff};
use crate::static_params::StaticParameters;

// Grids produced for one day, all in mm
#[derive(Debug, Clone)]
pub struct DayFluxes {
    pub pet: Grid,
    pub aet: Grid,
    pub precipitation: Grid,
    pub runoff: Grid,
    pub soil_water: Grid, // end-of-day storage, becomes tomorrow's S_prev
}

/// Execute one timestep. Pure: nothing is written anywhere.
pub fn step(
    soil_water_prev: &Grid,
    inputs: DailyInputs,
    params: &StaticParameters,
    water_runoff: WaterRunoff,
) -> Result<DayFluxes> {
    let record = inputs.record;
    if !(1..=12).contains(&record.month) {
        return Err(ModelError::InvalidRecord {
            source_name: "climate records".to_string(),
            line: 0,
            message: format!("day {}: month {} out of range", record.day_id, record.month),
        });
    }
    let shape = params.shape();
    soil_water_prev.ensure_shape("soil water", shape)?;
    inputs.precipitation.ensure_shape("precipitation", shape)?;

    let precipitation = inputs.precipitation;
    let pet = potential_et(
        params.haude_factor(record.month),
        record.temperature_c(),
        record.relative_humidity,
    );
    let aet = actual_et(&pet, soil_water_prev, params);
    let runoff = total_runoff(&precipitation, &pet, soil_water_prev, params, water_runoff);
    let soil_water = soil_water_prev + &precipitation - &aet - &runoff;

    Ok(DayFluxes {
        pet,
        aet,
        precipitation,
        runoff,
        soil_water,
    })
}
