/*!
Parameter sweeps over the reduction-point factor and the routing coefficient.

Every `(rp_factor, c)` pair is an independent run: static parameters are
derived afresh, soil water starts from its own copy of the initial grid and
results go to a table of their own. With the `threading` feature the pairs
run on the rayon pool.
*/
use log::{error, info, warn};
use serde::Deserialize;

#[cfg(feature = "threading")]
use rayon::prelude::*;

use crate::error::{ModelError, Result};
use crate::grid::Grid;
use crate::results::ResultSink;
use crate::simulation::{RunSummary, SimulationRunner};
use crate::static_params::{StaticGrids, StaticParameters};

// What a failed combination does to the rest of the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Skip,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPoint {
    pub rp_factor: f64,
    pub routing_coefficient: f64,
}

impl SweepPoint {
    // "rp85_c150"; the factor is rounded, not truncated, to whole percent
    pub fn tag(&self) -> String {
        format!(
            "rp{}_c{}",
            (self.rp_factor * 100.0).round() as i64,
            self.routing_coefficient
        )
    }

    pub fn table_name(&self, base: &str) -> String {
        format!("{base}_{}", self.tag())
    }
}

// Cartesian product, rp_factor in the outer loop
pub fn sweep_points(rp_factors: &[f64], routing_coefficients: &[f64]) -> Vec<SweepPoint> {
    rp_factors
        .iter()
        .flat_map(|&rp_factor| {
            routing_coefficients.iter().map(move |&routing_coefficient| SweepPoint {
                rp_factor,
                routing_coefficient,
            })
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct SweepSummary {
    pub completed: Vec<(SweepPoint, RunSummary)>,
    pub failed: Vec<(SweepPoint, ModelError)>,
    pub cancelled: bool,
}

pub struct ParameterSweepRunner<'a> {
    grids: &'a StaticGrids,
    initial_soil_water: &'a Grid,
    runner: SimulationRunner<'a>,
    output_name: String,
    policy: FailurePolicy,
}

impl<'a> ParameterSweepRunner<'a> {
    pub fn new(
        grids: &'a StaticGrids,
        initial_soil_water: &'a Grid,
        runner: SimulationRunner<'a>,
        output_name: impl Into<String>,
        policy: FailurePolicy,
    ) -> Self {
        ParameterSweepRunner {
            grids,
            initial_soil_water,
            runner,
            output_name: output_name.into(),
            policy,
        }
    }

    // One combination, start to finish
    pub fn run_point<S: ResultSink>(&self, point: &SweepPoint, sink: &mut S) -> Result<RunSummary> {
        let params = StaticParameters::derive(self.grids, point.rp_factor, point.routing_coefficient)?;
        self.runner.run(
            &params,
            self.initial_soil_water,
            &point.table_name(&self.output_name),
            &point.tag(),
            sink,
        )
    }

    fn open_and_run<S, F>(&self, point: &SweepPoint, open_sink: &F) -> Result<RunSummary>
    where
        S: ResultSink,
        F: Fn(&SweepPoint) -> Result<S>,
    {
        let mut sink = open_sink(point)?;
        self.run_point(point, &mut sink)
    }

    /**
    Runs every point, opening a result sink per point with `open_sink`.

    Under `FailurePolicy::Skip` a failed point is logged and recorded in the
    summary; under `Abort` its error ends the sweep. A cancelled run ends the
    sweep without starting further points.
    */
    pub fn run<S, F>(&self, points: &[SweepPoint], open_sink: F) -> Result<SweepSummary>
    where
        S: ResultSink,
        F: Fn(&SweepPoint) -> Result<S> + Sync,
    {
        info!(
            "parameter sweep: {} combination(s), failure policy {:?}",
            points.len(),
            self.policy
        );
        let mut summary = SweepSummary::default();

        #[cfg(not(feature = "threading"))]
        for point in points {
            if self.runner.cancel_token().is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let outcome = self.open_and_run(point, &open_sink);
            self.record(&mut summary, *point, outcome)?;
        }

        #[cfg(feature = "threading")]
        {
            let outcomes: Vec<_> = points
                .par_iter()
                .map(|point| {
                    if self.runner.cancel_token().is_cancelled() {
                        return None;
                    }
                    let outcome = self.open_and_run(point, &open_sink);
                    // points already running finish their current day and stop
                    if outcome.is_err() && self.policy == FailurePolicy::Abort {
                        self.runner.cancel_token().cancel();
                    }
                    Some((*point, outcome))
                })
                .collect();
            for entry in outcomes {
                match entry {
                    Some((point, outcome)) => self.record(&mut summary, point, outcome)?,
                    None => summary.cancelled = true,
                }
            }
        }

        info!(
            "parameter sweep finished: {} completed, {} failed",
            summary.completed.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    fn record(&self, summary: &mut SweepSummary, point: SweepPoint, outcome: Result<RunSummary>) -> Result<()> {
        match outcome {
            Ok(run) => {
                summary.cancelled |= run.cancelled;
                summary.completed.push((point, run));
                Ok(())
            }
            Err(e) => match self.policy {
                FailurePolicy::Skip => {
                    warn!("combination {} failed and is skipped: {e}", point.tag());
                    summary.failed.push((point, e));
                    Ok(())
                }
                FailurePolicy::Abort => {
                    error!("combination {} failed, aborting sweep: {e}", point.tag());
                    Err(e)
                }
            },
        }
    }
}
