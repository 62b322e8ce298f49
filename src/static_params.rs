// Static soil and land-cover grids, and the per-run parameters derived from them
use log::info;
use serde::Deserialize;

use crate::error::{ModelError, Result};
use crate::grid::Grid;
use crate::raster_io::GridSource;

pub const MONTHS: usize = 12;

// Names under which the static grids are stored in the grid source
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GridNames {
    pub field_capacity: String, // field capacity of the effective root zone [mm]
    pub wilting_point: String,  // wilting point [mm]
    pub water_mask: String,     // 1 = water body, 0 = land
    pub root_depth: String,     // effective root zone depth [m]
    pub haude_prefix: String,   // monthly Haude factors are <prefix>_1 .. <prefix>_12
}

impl Default for GridNames {
    fn default() -> Self {
        GridNames {
            field_capacity: "field_capacity".to_string(),
            wilting_point: "wilting_point".to_string(),
            water_mask: "water_mask".to_string(),
            root_depth: "root_depth".to_string(),
            haude_prefix: "haude".to_string(),
        }
    }
}

impl GridNames {
    pub fn haude(&self, month: usize) -> String {
        format!("{}_{month}", self.haude_prefix)
    }
}

// Inputs that never change during a run or a sweep
#[derive(Debug, Clone)]
pub struct StaticGrids {
    pub field_capacity: Grid,
    pub wilting_point: Grid,
    pub water_mask: Grid,
    pub root_depth: Grid,
    haude: Vec<Grid>, // index 0 = January
}

impl StaticGrids {
    pub fn new(
        field_capacity: Grid,
        wilting_point: Grid,
        water_mask: Grid,
        root_depth: Grid,
        haude: Vec<Grid>,
    ) -> Result<Self> {
        if haude.len() != MONTHS {
            return Err(ModelError::Config(format!(
                "expected {MONTHS} monthly Haude factor grids, got {}",
                haude.len()
            )));
        }
        let shape = field_capacity.shape();
        wilting_point.ensure_shape("wilting point", shape)?;
        water_mask.ensure_shape("water mask", shape)?;
        root_depth.ensure_shape("root depth", shape)?;
        for (i, h) in haude.iter().enumerate() {
            h.ensure_shape(&format!("Haude factor month {}", i + 1), shape)?;
        }
        Ok(StaticGrids {
            field_capacity,
            wilting_point,
            water_mask,
            root_depth,
            haude,
        })
    }

    // Loads every static grid; the first missing one aborts
    pub fn load(source: &dyn GridSource, names: &GridNames) -> Result<Self> {
        let field_capacity = source.load(&names.field_capacity)?;
        let wilting_point = source.load(&names.wilting_point)?;
        let water_mask = source.load(&names.water_mask)?;
        let root_depth = source.load(&names.root_depth)?;
        let haude = (1..=MONTHS)
            .map(|m| source.load(&names.haude(m)))
            .collect::<Result<Vec<_>>>()?;
        info!(
            "loaded static grids ({} x {} cells, cell size {} m)",
            field_capacity.shape().0,
            field_capacity.shape().1,
            field_capacity.cell_size()
        );
        Self::new(field_capacity, wilting_point, water_mask, root_depth, haude)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.field_capacity.shape()
    }

    // Soil water before the first day: a named grid of matching shape, else field capacity
    pub fn initial_soil_water(&self, source: &dyn GridSource, name: Option<&str>) -> Result<Grid> {
        match name {
            Some(name) => {
                let initial = source.load(name)?;
                initial.ensure_shape("initial soil water", self.shape())?;
                Ok(initial)
            }
            None => Ok(self.field_capacity.clone()),
        }
    }

    pub fn haude_factor(&self, month: u32) -> &Grid {
        &self.haude[month as usize - 1]
    }

    // Every grid restricted to the cells that carry data in `mask`
    pub fn clip_to(&self, mask: &Grid) -> StaticGrids {
        StaticGrids {
            field_capacity: self.field_capacity.extract_by_mask(mask),
            wilting_point: self.wilting_point.extract_by_mask(mask),
            water_mask: self.water_mask.extract_by_mask(mask),
            root_depth: self.root_depth.extract_by_mask(mask),
            haude: self.haude.iter().map(|h| h.extract_by_mask(mask)).collect(),
        }
    }
}

// Parameters of one (rp_factor, c) combination
#[derive(Debug, Clone)]
pub struct StaticParameters<'a> {
    grids: &'a StaticGrids,
    pub rp_factor: f64,           // reduction point as a fraction of field capacity
    pub routing_coefficient: f64, // c
    pub reduction_point: Grid,    // FK * rp_factor [mm]
    pub rp_wp_difference: Grid,   // RP - WP [mm], zero is a valid value
    pub routing_lambda: Grid,     // c / (L * 1000)^2
}

impl<'a> StaticParameters<'a> {
    pub fn derive(grids: &'a StaticGrids, rp_factor: f64, routing_coefficient: f64) -> Result<Self> {
        if !(rp_factor > 0.0 && rp_factor <= 1.0) {
            return Err(ModelError::invalid_parameter(
                "rp_factor",
                rp_factor,
                "must lie in (0, 1]",
            ));
        }
        if !routing_coefficient.is_finite() || routing_coefficient < 0.0 {
            return Err(ModelError::invalid_parameter(
                "routing_coefficient",
                routing_coefficient,
                "must be finite and non-negative",
            ));
        }
        let reduction_point = &grids.field_capacity * rp_factor;
        let rp_wp_difference = &reduction_point - &grids.wilting_point;
        let routing_lambda = routing_coefficient / (&grids.root_depth * 1000.0).powi(2);
        Ok(StaticParameters {
            grids,
            rp_factor,
            routing_coefficient,
            reduction_point,
            rp_wp_difference,
            routing_lambda,
        })
    }

    pub fn field_capacity(&self) -> &Grid {
        &self.grids.field_capacity
    }

    pub fn wilting_point(&self) -> &Grid {
        &self.grids.wilting_point
    }

    pub fn water_mask(&self) -> &Grid {
        &self.grids.water_mask
    }

    pub fn haude_factor(&self, month: u32) -> &Grid {
        self.grids.haude_factor(month)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.grids.shape()
    }
}
