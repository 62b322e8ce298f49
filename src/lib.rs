pub mod catchment;
pub mod config;
pub mod daily_inputs;
pub mod error;
pub mod evapotranspiration;
pub mod grid;
pub mod precipitation;
pub mod raster_io;
pub mod results;
pub mod runoff;
pub mod simulation;
pub mod static_params;
pub mod sweep;
mod table_io;
pub mod water_balance;

pub use catchment::CatchmentAggregator;
pub use error::{ModelError, Result};
pub use grid::{Grid, GridGeometry};
pub use simulation::{CancelToken, RunSummary, SimulationRunner};
pub use static_params::{StaticGrids, StaticParameters};
pub use sweep::{ParameterSweepRunner, SweepPoint};
pub use water_balance::{DayFluxes, step};
