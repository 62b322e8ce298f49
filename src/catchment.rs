// Reduction of a runoff grid to catchment discharge volumes
use std::collections::BTreeSet;

use crate::error::{ModelError, Result};
use crate::grid::Grid;

pub type ZoneKey = i64;

// Runoff depth summed over cells [mm] to volume [m³]
pub fn volume_m3(runoff_sum_mm: f64, cell_size_m: f64) -> f64 {
    runoff_sum_mm * 0.001 * cell_size_m * cell_size_m
}

#[derive(Debug, Clone)]
enum Zoning {
    // The grid is already clipped to a single catchment
    Whole,
    // Cell values of `zones` are catchment keys, nodata = outside every catchment
    Zones {
        zones: Grid,
        keys: Vec<ZoneKey>,
        key_label: String,
    },
}

#[derive(Debug, Clone)]
pub struct CatchmentAggregator {
    zoning: Zoning,
}

impl CatchmentAggregator {
    pub fn whole() -> Self {
        CatchmentAggregator { zoning: Zoning::Whole }
    }

    /**
    Per-zone aggregation. Zone cells must hold whole numbers; `key_label` is
    used when naming per-zone result tables.
    */
    pub fn zonal(zones: Grid, key_label: impl Into<String>) -> Result<Self> {
        let mut keys = BTreeSet::new();
        for &v in zones.values().iter() {
            if v.is_nan() {
                continue;
            }
            if v.fract() != 0.0 {
                return Err(ModelError::Config(format!("zone grid holds non-integer key {v}")));
            }
            keys.insert(v as ZoneKey);
        }
        if keys.is_empty() {
            return Err(ModelError::Config("zone grid has no zones".to_string()));
        }
        Ok(CatchmentAggregator {
            zoning: Zoning::Zones {
                zones,
                keys: keys.into_iter().collect(),
                key_label: key_label.into(),
            },
        })
    }

    pub fn zone_grid(&self) -> Option<&Grid> {
        match &self.zoning {
            Zoning::Whole => None,
            Zoning::Zones { zones, .. } => Some(zones),
        }
    }

    pub fn zone_keys(&self) -> Vec<Option<ZoneKey>> {
        match &self.zoning {
            Zoning::Whole => vec![None],
            Zoning::Zones { keys, .. } => keys.iter().copied().map(Some).collect(),
        }
    }

    // Result table of one zone: the base name, or base name plus zone suffix
    pub fn table_name(&self, base: &str, zone: Option<ZoneKey>) -> String {
        match (&self.zoning, zone) {
            (Zoning::Zones { key_label, .. }, Some(key)) => format!("{base}_{key_label}{key}"),
            _ => base.to_string(),
        }
    }

    /**
    Discharge volume [m³] per zone, in ascending key order.

    Nodata runoff cells count as zero, so a partially covered zone is
    under-counted rather than dropped.
    */
    pub fn discharge(&self, runoff: &Grid) -> Vec<(Option<ZoneKey>, f64)> {
        let cell_size = runoff.cell_size();
        match &self.zoning {
            Zoning::Whole => vec![(None, volume_m3(runoff.sum_nodata_as_zero(), cell_size))],
            Zoning::Zones { zones, keys, .. } => {
                assert_eq!(zones.shape(), runoff.shape(), "zone grid does not match runoff grid");
                let mut sums = vec![0.0; keys.len()];
                // column-major walk, same order as the whole-grid sum
                for (&z, &r) in zones.values().iter().zip(runoff.values().iter()) {
                    if z.is_nan() || r.is_nan() {
                        continue;
                    }
                    if let Ok(i) = keys.binary_search(&(z as ZoneKey)) {
                        sums[i] += r;
                    }
                }
                keys.iter()
                    .zip(sums)
                    .map(|(&k, s)| (Some(k), volume_m3(s, cell_size)))
                    .collect()
            }
        }
    }
}
