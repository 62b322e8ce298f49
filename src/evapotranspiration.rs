use crate::grid::Grid;
use crate::static_params::StaticParameters;

/**
Saturation vapour pressure over water [hPa] (Magnus form used by the Haude method).

# Arguments
* `temperature_c` - daily mean air temperature [°C].
*/
pub fn saturation_vapor_pressure(temperature_c: f64) -> f64 {
    6.1 * 10f64.powf((7.5 * temperature_c) / (temperature_c + 237.2))
}

/**
Potential evapotranspiration after Haude [mm/day].

`pet = haude_factor * es(T) * (1 - rh / 100)`. Humidity and temperature are
taken as given; values outside the physical range produce negative or
inflated PET.

# Arguments
* `haude_factor` - Haude factor grid of the record's month.
* `temperature_c` - daily mean air temperature [°C].
* `relative_humidity` - relative humidity [%].
*/
pub fn potential_et(haude_factor: &Grid, temperature_c: f64, relative_humidity: f64) -> Grid {
    haude_factor * (saturation_vapor_pressure(temperature_c) * (1.0 - relative_humidity / 100.0))
}

/**
Actual evapotranspiration [mm/day], PET reduced by soil-water stress.

Evaluated per cell as a strict decision tree, first match wins:
1. water body: PET
2. soil water at or above the reduction point: PET
3. reduction point equal to the wilting point: 0
4. otherwise PET scaled linearly by `(S - WP) / (RP - WP)`
*/
pub fn actual_et(pet: &Grid, soil_water_prev: &Grid, params: &StaticParameters) -> Grid {
    let stressed = (soil_water_prev - params.wilting_point()) / &params.rp_wp_difference * pet;
    let below_rp = Grid::select(&params.rp_wp_difference.eq_scalar(0.0), 0.0, &stressed);
    let land = Grid::select(&soil_water_prev.ge(&params.reduction_point), pet, &below_rp);
    Grid::select(&params.water_mask().eq_scalar(1.0), pet, &land)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_params::tests::{single_cell, single_cell_grids};
    use approx::assert_relative_eq;

    #[test]
    fn saturation_vapor_pressure_at_reference_points() {
        assert_relative_eq!(saturation_vapor_pressure(0.0), 6.1);
        assert_relative_eq!(saturation_vapor_pressure(10.0), 12.2667, epsilon = 1e-4);
    }

    #[test]
    fn pet_scales_with_dryness() {
        let haude = single_cell(0.25);
        let pet = potential_et(&haude, 10.0, 60.0);
        assert_relative_eq!(pet.get(0, 0), 0.25 * saturation_vapor_pressure(10.0) * 0.4);
        assert_eq!(potential_et(&haude, 10.0, 100.0).get(0, 0), 0.0);
    }

    #[test]
    fn humidity_above_saturation_is_not_clamped() {
        let pet = potential_et(&single_cell(0.25), 10.0, 110.0);
        assert!(pet.get(0, 0) < 0.0);
    }

    #[test]
    fn water_cells_evaporate_at_pet() {
        let grids = single_cell_grids(100.0, 20.0, 1.0, 1.0, 0.2);
        let params = StaticParameters::derive(&grids, 0.85, 150.0).unwrap();
        let pet = single_cell(3.0);
        for s in [0.0, 10.0, 50.0, 120.0] {
            assert_eq!(actual_et(&pet, &single_cell(s), &params).get(0, 0), 3.0);
        }
    }

    #[test]
    fn unstressed_soil_evaporates_at_pet() {
        let grids = single_cell_grids(100.0, 20.0, 0.0, 1.0, 0.2);
        let params = StaticParameters::derive(&grids, 0.85, 150.0).unwrap();
        let pet = single_cell(3.0);
        assert_eq!(actual_et(&pet, &single_cell(90.0), &params).get(0, 0), 3.0);
        assert_eq!(actual_et(&pet, &single_cell(85.0), &params).get(0, 0), 3.0);
    }

    #[test]
    fn stressed_soil_is_reduced_linearly() {
        let grids = single_cell_grids(100.0, 20.0, 0.0, 1.0, 0.2);
        let params = StaticParameters::derive(&grids, 0.85, 150.0).unwrap();
        let pet = single_cell(3.0);
        let aet = actual_et(&pet, &single_cell(50.0), &params);
        assert_relative_eq!(aet.get(0, 0), 3.0 * 30.0 / 65.0);
    }

    #[test]
    fn zero_rp_wp_difference_gives_zero_aet() {
        // RP = 100 * 0.5 = 50 = WP
        let grids = single_cell_grids(100.0, 50.0, 0.0, 1.0, 0.2);
        let params = StaticParameters::derive(&grids, 0.5, 150.0).unwrap();
        let aet = actual_et(&single_cell(3.0), &single_cell(40.0), &params);
        assert_eq!(aet.get(0, 0), 0.0);
    }

    #[test]
    fn nodata_soil_water_gives_nodata_on_land() {
        let grids = single_cell_grids(100.0, 20.0, 0.0, 1.0, 0.2);
        let params = StaticParameters::derive(&grids, 0.85, 150.0).unwrap();
        let aet = actual_et(&single_cell(3.0), &single_cell(f64::NAN), &params);
        assert!(aet.is_nodata(0, 0));
    }
}
