/*!
Module for the daily runoff of every grid cell.

Total runoff is the sum of a land term and a water-body term. Land cells drain
a slow routing term that grows with the square of the soil water above the
wilting point, plus any overflow above field capacity. Water-body cells pass on
the precipitation surplus over PET. All depths are in millimetres per day.
*/
use serde::Deserialize;

use crate::grid::Grid;
use crate::static_params::StaticParameters;

// How the water-body balance treats days where PET exceeds precipitation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaterRunoff {
    #[default]
    Clamped,   // max(0, P - PET)
    Unclamped, // P - PET, negative on evaporation-dominated days
}

/**
Water in excess of field capacity, drained on the same day.

# Arguments
- `precipitation` - daily precipitation [mm].
- `soil_water_prev` - soil water at the end of the previous day [mm].
- `field_capacity` - field capacity [mm].

# Returns
`max(0, P + S - FK)` per cell.
*/
pub fn overflow(precipitation: &Grid, soil_water_prev: &Grid, field_capacity: &Grid) -> Grid {
    let available = precipitation + soil_water_prev;
    let excess = &available - field_capacity;
    Grid::select(&available.gt(field_capacity), &excess, 0.0)
}

/**
Runoff of land cells: `lambda * (S - WP)^2 + overflow`, zero on water cells.

The quadratic term is applied even when the soil water has fallen below the
wilting point.
*/
pub fn land_runoff(soil_water_prev: &Grid, overflow: &Grid, params: &StaticParameters) -> Grid {
    let routed = &params.routing_lambda * (soil_water_prev - params.wilting_point()).powi(2);
    Grid::select(&params.water_mask().eq_scalar(0.0), &(routed + overflow), 0.0)
}

/**
Runoff of water-body cells: the mask times the precipitation surplus.

# Arguments
- `mode` - whether a PET surplus is cut at zero.
*/
pub fn water_runoff(precipitation: &Grid, pet: &Grid, water_mask: &Grid, mode: WaterRunoff) -> Grid {
    let surplus = precipitation - pet;
    match mode {
        WaterRunoff::Clamped => water_mask * Grid::select(&precipitation.gt(pet), &surplus, 0.0),
        WaterRunoff::Unclamped => water_mask * surplus,
    }
}

// Total runoff of one day [mm]
pub fn total_runoff(
    precipitation: &Grid,
    pet: &Grid,
    soil_water_prev: &Grid,
    params: &StaticParameters,
    mode: WaterRunoff,
) -> Grid {
    let excess = overflow(precipitation, soil_water_prev, params.field_capacity());
    let land = land_runoff(soil_water_prev, &excess, params);
    land + water_runoff(precipitation, pet, params.water_mask(), mode)
}
