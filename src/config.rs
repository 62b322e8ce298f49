/*!
Run configuration, read from a TOML file.

Relative paths in the file are taken relative to the directory holding it.
Example:

```toml
workspace = "out/run_2003"
data_dir = "data"
start = 20030101
end = 20030131
rp_factor = { min = 0.7, max = 0.9, step = 0.05 }
routing_coefficient = 150

[climate]
table = "data/climate.csv"

[precipitation]
source = "idw"
stations = "data/stations.csv"
series = "data/precipitation.csv"
power = 1.0

[persist]
runoff = true
```
*/
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::daily_inputs::{DayId, day_id_to_date};
use crate::error::{ModelError, Result};
use crate::precipitation::IdwConfig;
use crate::runoff::WaterRunoff;
use crate::simulation::Persistence;
use crate::static_params::GridNames;
use crate::sweep::FailurePolicy;

// Parameter sweep axis: one value, or min..=max in fixed steps
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParameterRange {
    Single(f64),
    Stepped { min: f64, max: f64, step: f64 },
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ParameterRange {
    /**
    The values of the axis in ascending order.

    Each increment is rounded to two decimals, so `0.7 + 0.05` steps land on
    `0.75` and `max` is included whenever the stepping reaches it.
    */
    pub fn values(&self, name: &'static str) -> Result<Vec<f64>> {
        match *self {
            ParameterRange::Single(v) => Ok(vec![v]),
            ParameterRange::Stepped { min, max, step } => {
                if !(step > 0.0) {
                    return Err(ModelError::invalid_parameter(name, step, "step must be positive"));
                }
                if min > max {
                    return Err(ModelError::invalid_parameter(name, min, format!("min exceeds max {max}")));
                }
                let mut values = Vec::new();
                let mut v = min;
                while v <= max {
                    values.push(v);
                    let next = round2(v + step);
                    if next <= v {
                        return Err(ModelError::invalid_parameter(
                            name,
                            step,
                            "step vanishes when rounded to two decimals",
                        ));
                    }
                    v = next;
                }
                Ok(values)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CatchmentConfig {
    pub zones: Option<String>, // zone grid in data_dir; none = the whole grid is one catchment
    pub key_field: String,     // label used in per-zone table names
    pub clip: bool,            // restrict static grids to cells inside a zone
}

impl Default for CatchmentConfig {
    fn default() -> Self {
        CatchmentConfig {
            zones: None,
            key_field: "Id".to_string(),
            clip: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClimateConfig {
    pub table: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum PrecipitationConfig {
    Idw {
        stations: PathBuf,
        series: PathBuf,
        #[serde(flatten)]
        interpolation: IdwConfig,
    },
    Grids {
        dir: Option<PathBuf>, // defaults to data_dir
        #[serde(default = "default_precipitation_prefix")]
        prefix: String,
    },
}

fn default_precipitation_prefix() -> String {
    "P".to_string()
}

fn default_output_name() -> String {
    "Ergebnis".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    pub workspace: PathBuf,
    pub data_dir: PathBuf,
    pub start: DayId,
    pub end: DayId,
    pub rp_factor: ParameterRange,
    pub routing_coefficient: ParameterRange,
    #[serde(default)]
    pub initial_soil_water: Option<String>, // grid name; field capacity when unset
    #[serde(default = "default_output_name")]
    pub output_name: String,
    #[serde(default = "default_true")]
    pub overwrite: bool,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    #[serde(default)]
    pub water_runoff: WaterRunoff,
    #[serde(default)]
    pub grids: GridNames,
    #[serde(default)]
    pub catchment: CatchmentConfig,
    pub climate: ClimateConfig,
    pub precipitation: PrecipitationConfig,
    #[serde(default)]
    pub persist: Persistence,
}

// Output directories of a prepared workspace
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceLayout {
    pub root: PathBuf,
    pub tables: PathBuf,
    pub grids: PathBuf,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(text).map_err(|e| ModelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ModelError::io(path, e))?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        day_id_to_date(self.start)?;
        day_id_to_date(self.end)?;
        if self.start > self.end {
            return Err(ModelError::Config(format!(
                "start {} lies after end {}",
                self.start, self.end
            )));
        }
        self.rp_factor.values("rp_factor")?;
        self.routing_coefficient.values("routing_coefficient")?;
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.workspace);
        resolve(&mut self.data_dir);
        resolve(&mut self.climate.table);
        match &mut self.precipitation {
            PrecipitationConfig::Idw { stations, series, .. } => {
                resolve(stations);
                resolve(series);
            }
            PrecipitationConfig::Grids { dir: Some(dir), .. } => resolve(dir),
            PrecipitationConfig::Grids { dir: None, .. } => {}
        }
    }

    /**
    Creates the workspace with its `tables/` and `grids/` directories.

    An existing workspace is deleted first when `overwrite` is set and is an
    error otherwise.
    */
    pub fn prepare_workspace(&self) -> Result<WorkspaceLayout> {
        let root = self.workspace.clone();
        if root.exists() {
            if !self.overwrite {
                return Err(ModelError::WorkspaceExists(root));
            }
            info!("removing existing workspace {}", root.display());
            fs::remove_dir_all(&root).map_err(|e| ModelError::io(&root, e))?;
        }
        let layout = WorkspaceLayout {
            tables: root.join("tables"),
            grids: root.join("grids"),
            root,
        };
        for dir in [&layout.tables, &layout.grids] {
            fs::create_dir_all(dir).map_err(|e| ModelError::io(dir, e))?;
        }
        info!("workspace ready at {}", layout.root.display());
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        workspace = "out"
        data_dir = "data"
        start = 20030101
        end = 20030131
        rp_factor = 0.85
        routing_coefficient = 150

        [climate]
        table = "climate.csv"

        [precipitation]
        source = "grids"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = RunConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.rp_factor, ParameterRange::Single(0.85));
        assert_eq!(config.routing_coefficient, ParameterRange::Single(150.0));
        assert_eq!(config.output_name, "Ergebnis");
        assert!(config.overwrite);
        assert_eq!(config.on_failure, FailurePolicy::Skip);
        assert_eq!(config.water_runoff, WaterRunoff::Clamped);
        assert_eq!(config.grids, GridNames::default());
        assert_eq!(config.catchment.key_field, "Id");
        assert_eq!(config.persist, Persistence::default());
        assert_eq!(
            config.precipitation,
            PrecipitationConfig::Grids {
                dir: None,
                prefix: "P".to_string()
            }
        );
    }

    #[test]
    fn idw_precipitation_and_toggles() {
        let text = MINIMAL.replace(
            "source = \"grids\"",
            "source = \"idw\"\nstations = \"s.csv\"\nseries = \"p.csv\"\npower = 2.0\n\n[persist]\nrunoff = true\nsoil_water = true",
        );
        let config = RunConfig::from_toml_str(&text).unwrap();
        match config.precipitation {
            PrecipitationConfig::Idw { interpolation, .. } => {
                assert_eq!(interpolation, IdwConfig::default().with_power(2.0));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(config.persist.runoff && config.persist.soil_water);
        assert!(!config.persist.pet);
    }

    #[test]
    fn stepped_ranges_round_each_increment() {
        let rp = ParameterRange::Stepped {
            min: 0.7,
            max: 0.85,
            step: 0.05,
        };
        assert_eq!(rp.values("rp_factor").unwrap(), vec![0.7, 0.75, 0.8, 0.85]);
        let c = ParameterRange::Stepped {
            min: 100.0,
            max: 220.0,
            step: 50.0,
        };
        assert_eq!(c.values("c").unwrap(), vec![100.0, 150.0, 200.0]);
    }

    #[test]
    fn bad_ranges_are_rejected() {
        let zero_step = ParameterRange::Stepped {
            min: 0.7,
            max: 0.9,
            step: 0.0,
        };
        assert!(zero_step.values("rp_factor").is_err());
        let text = MINIMAL.replace("rp_factor = 0.85", "rp_factor = { min = 0.9, max = 0.8, step = 0.05 }");
        assert!(RunConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn steps_below_the_rounding_are_rejected() {
        let tiny = ParameterRange::Stepped {
            min: 0.80,
            max: 0.85,
            step: 0.001,
        };
        assert!(matches!(
            tiny.values("rp_factor"),
            Err(ModelError::InvalidParameter { name: "rp_factor", .. })
        ));
        let text = MINIMAL.replace("rp_factor = 0.85", "rp_factor = { min = 0.8, max = 0.85, step = 0.004 }");
        assert!(RunConfig::from_toml_str(&text).is_err());
        let smallest = ParameterRange::Stepped {
            min: 0.80,
            max: 0.83,
            step: 0.01,
        };
        assert_eq!(smallest.values("rp_factor").unwrap().len(), 4);
    }

    #[test]
    fn invalid_dates_are_rejected() {
        let text = MINIMAL.replace("end = 20030131", "end = 20030231");
        assert!(matches!(
            RunConfig::from_toml_str(&text).unwrap_err(),
            ModelError::InvalidDayId(20030231)
        ));
    }

    #[test]
    fn workspace_is_recreated_or_refused() {
        let root = std::env::temp_dir().join(format!("swm_workspace_{}", std::process::id()));
        let mut config = RunConfig::from_toml_str(MINIMAL).unwrap();
        config.workspace = root.clone();

        let layout = config.prepare_workspace().unwrap();
        fs::write(layout.tables.join("stale.csv"), "x").unwrap();
        let layout = config.prepare_workspace().unwrap();
        assert!(layout.grids.is_dir());
        assert!(!layout.tables.join("stale.csv").exists());

        config.overwrite = false;
        assert!(matches!(config.prepare_workspace(), Err(ModelError::WorkspaceExists(_))));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let mut config = RunConfig::from_toml_str(MINIMAL).unwrap();
        config.resolve_paths(Path::new("/runs"));
        assert_eq!(config.data_dir, PathBuf::from("/runs/data"));
        assert_eq!(config.climate.table, PathBuf::from("/runs/climate.csv"));
    }
}
