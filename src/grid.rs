/*!
Raster grids and the cellwise algebra the water balance is written in.

A `Grid` is a dense `nalgebra::DMatrix<f64>` plus its georeference. Row 0 is the
northern edge. Nodata cells are NaN, so nodata propagates through every
arithmetic operation the same way it does in raster calculators.

Comparisons return condition grids holding 1.0 (true), 0.0 (false) or NaN
(nodata), and `Grid::select` composes them into nested conditionals.
*/
use std::ops::{Add, Div, Mul, Sub};

use nalgebra::DMatrix;

use crate::error::{ModelError, Result};

// Georeference of a square-celled raster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub nrows: usize,
    pub ncols: usize,
    pub xll_corner: f64, // x of the lower-left corner [m]
    pub yll_corner: f64, // y of the lower-left corner [m]
    pub cell_size: f64,  // side length of one cell [m]
}

impl GridGeometry {
    pub fn new(nrows: usize, ncols: usize, xll_corner: f64, yll_corner: f64, cell_size: f64) -> Self {
        GridGeometry {
            nrows,
            ncols,
            xll_corner,
            yll_corner,
            cell_size,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn cell_count(&self) -> usize {
        self.nrows * self.ncols
    }

    // Cell area [m²]
    pub fn cell_area(&self) -> f64 {
        self.cell_size * self.cell_size
    }

    // Map coordinates of the centre of cell (row, col)
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.xll_corner + (col as f64 + 0.5) * self.cell_size;
        let y = self.yll_corner + ((self.nrows - row) as f64 - 0.5) * self.cell_size;
        (x, y)
    }
}

/// Either side of a grid expression: another grid or a constant.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    Grid(&'a Grid),
    Scalar(f64),
}

impl Operand<'_> {
    fn at(&self, row: usize, col: usize) -> f64 {
        match self {
            Operand::Grid(g) => g.values[(row, col)],
            Operand::Scalar(v) => *v,
        }
    }
}

impl<'a> From<&'a Grid> for Operand<'a> {
    fn from(grid: &'a Grid) -> Self {
        Operand::Grid(grid)
    }
}

impl From<f64> for Operand<'_> {
    fn from(value: f64) -> Self {
        Operand::Scalar(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    geometry: GridGeometry,
    values: DMatrix<f64>,
}

impl Grid {
    pub fn filled(geometry: GridGeometry, value: f64) -> Self {
        Grid {
            geometry,
            values: DMatrix::from_element(geometry.nrows, geometry.ncols, value),
        }
    }

    // Build from values listed row by row, north to south
    pub fn from_row_slice(geometry: GridGeometry, values: &[f64]) -> Result<Self> {
        if values.len() != geometry.cell_count() {
            return Err(ModelError::ShapeMismatch {
                name: "row slice".to_string(),
                expected: geometry.shape(),
                actual: (values.len() / geometry.ncols.max(1), geometry.ncols),
            });
        }
        Ok(Grid {
            geometry,
            values: DMatrix::from_row_slice(geometry.nrows, geometry.ncols, values),
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    pub fn cell_size(&self) -> f64 {
        self.geometry.cell_size
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[(row, col)]
    }

    pub fn is_nodata(&self, row: usize, col: usize) -> bool {
        self.values[(row, col)].is_nan()
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn map(&self, f: impl FnMut(f64) -> f64) -> Grid {
        Grid {
            geometry: self.geometry,
            values: self.values.map(f),
        }
    }

    pub fn zip_map(&self, other: &Grid, f: impl FnMut(f64, f64) -> f64) -> Grid {
        assert_eq!(
            self.shape(),
            other.shape(),
            "cellwise operation on grids of different shape"
        );
        Grid {
            geometry: self.geometry,
            values: self.values.zip_map(&other.values, f),
        }
    }

    pub fn powi(&self, n: i32) -> Grid {
        self.map(|v| v.powi(n))
    }

    /**
    Cellwise conditional: `if_true` where `condition` is non-zero, `if_false`
    where it is zero, nodata where the condition itself is nodata.

    Both branches are read for every cell, so a branch may hold inf or NaN in
    cells it does not win without affecting the result.
    */
    pub fn select<'a>(
        condition: &Grid,
        if_true: impl Into<Operand<'a>>,
        if_false: impl Into<Operand<'a>>,
    ) -> Grid {
        let if_true = if_true.into();
        let if_false = if_false.into();
        for operand in [if_true, if_false] {
            if let Operand::Grid(g) = operand {
                assert_eq!(
                    condition.shape(),
                    g.shape(),
                    "select branch does not match condition shape"
                );
            }
        }
        let (nrows, ncols) = condition.shape();
        let values = DMatrix::from_fn(nrows, ncols, |r, c| {
            let cond = condition.values[(r, c)];
            if cond.is_nan() {
                f64::NAN
            } else if cond != 0.0 {
                if_true.at(r, c)
            } else {
                if_false.at(r, c)
            }
        });
        Grid {
            geometry: condition.geometry,
            values,
        }
    }

    pub fn eq_scalar(&self, value: f64) -> Grid {
        self.map(|v| condition(v, value, |a, b| a == b))
    }

    pub fn gt(&self, other: &Grid) -> Grid {
        self.zip_map(other, |a, b| condition(a, b, |a, b| a > b))
    }

    pub fn ge(&self, other: &Grid) -> Grid {
        self.zip_map(other, |a, b| condition(a, b, |a, b| a >= b))
    }

    // Sum over all cells, nodata counted as 0
    pub fn sum_nodata_as_zero(&self) -> f64 {
        self.values.iter().filter(|v| !v.is_nan()).sum()
    }

    // Copy of this grid with every cell that is nodata in `mask` set to nodata
    pub fn extract_by_mask(&self, mask: &Grid) -> Grid {
        self.zip_map(mask, |v, m| if m.is_nan() { f64::NAN } else { v })
    }

    pub fn ensure_shape(&self, name: &str, expected: (usize, usize)) -> Result<()> {
        if self.shape() != expected {
            return Err(ModelError::ShapeMismatch {
                name: name.to_string(),
                expected,
                actual: self.shape(),
            });
        }
        Ok(())
    }
}

fn condition(a: f64, b: f64, test: impl Fn(f64, f64) -> bool) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if test(a, b) {
        1.0
    } else {
        0.0
    }
}

macro_rules! impl_grid_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<&Grid> for &Grid {
            type Output = Grid;
            fn $method(self, rhs: &Grid) -> Grid {
                self.zip_map(rhs, |a, b| a $op b)
            }
        }

        impl $trait<Grid> for &Grid {
            type Output = Grid;
            fn $method(self, rhs: Grid) -> Grid {
                self.$method(&rhs)
            }
        }

        impl $trait<&Grid> for Grid {
            type Output = Grid;
            fn $method(self, rhs: &Grid) -> Grid {
                (&self).$method(rhs)
            }
        }

        impl $trait<Grid> for Grid {
            type Output = Grid;
            fn $method(self, rhs: Grid) -> Grid {
                (&self).$method(&rhs)
            }
        }

        impl $trait<f64> for &Grid {
            type Output = Grid;
            fn $method(self, rhs: f64) -> Grid {
                self.map(|a| a $op rhs)
            }
        }

        impl $trait<f64> for Grid {
            type Output = Grid;
            fn $method(self, rhs: f64) -> Grid {
                (&self).$method(rhs)
            }
        }

        impl $trait<&Grid> for f64 {
            type Output = Grid;
            fn $method(self, rhs: &Grid) -> Grid {
                rhs.map(|b| self $op b)
            }
        }

        impl $trait<Grid> for f64 {
            type Output = Grid;
            fn $method(self, rhs: Grid) -> Grid {
                self.$method(&rhs)
            }
        }
    };
}

impl_grid_op!(Add, add, +);
impl_grid_op!(Sub, sub, -);
impl_grid_op!(Mul, mul, *);
impl_grid_op!(Div, div, /);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn geom(nrows: usize, ncols: usize) -> GridGeometry {
        GridGeometry::new(nrows, ncols, 0.0, 0.0, 25.0)
    }

    fn grid(nrows: usize, ncols: usize, values: &[f64]) -> Grid {
        Grid::from_row_slice(geom(nrows, ncols), values).unwrap()
    }

    #[test]
    fn row_slice_is_north_to_south() {
        let g = grid(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(g.get(0, 2), 3.0);
        assert_eq!(g.get(1, 0), 4.0);
    }

    #[test]
    fn rejects_wrong_value_count() {
        let res = Grid::from_row_slice(geom(2, 2), &[1.0, 2.0, 3.0]);
        assert!(matches!(res, Err(ModelError::ShapeMismatch { .. })));
    }

    #[test]
    fn cell_centres() {
        let g = geom(2, 2);
        assert_eq!(g.cell_center(0, 0), (12.5, 37.5));
        assert_eq!(g.cell_center(1, 1), (37.5, 12.5));
        assert_eq!(g.cell_area(), 625.0);
    }

    #[test]
    fn arithmetic_with_grids_and_scalars() {
        let a = grid(1, 3, &[1.0, 2.0, 3.0]);
        let b = grid(1, 3, &[10.0, 20.0, 30.0]);
        let sum = &a + &b;
        assert_eq!(sum.get(0, 2), 33.0);
        let scaled = 2.0 * &a - 1.0;
        assert_eq!(scaled.get(0, 1), 3.0);
        let ratio = &b / &a;
        assert_relative_eq!(ratio.get(0, 2), 10.0);
        assert_eq!((1.0 - &a).get(0, 0), 0.0);
    }

    #[test]
    fn nodata_propagates() {
        let a = grid(1, 2, &[f64::NAN, 1.0]);
        let b = grid(1, 2, &[5.0, 5.0]);
        let sum = &a + &b;
        assert!(sum.is_nodata(0, 0));
        assert_eq!(sum.get(0, 1), 6.0);
        assert_eq!(sum.sum_nodata_as_zero(), 6.0);
    }

    #[test]
    fn comparisons_yield_condition_grids() {
        let a = grid(1, 3, &[1.0, 2.0, f64::NAN]);
        let b = grid(1, 3, &[2.0, 2.0, 2.0]);
        let ge = a.ge(&b);
        assert_eq!(ge.get(0, 0), 0.0);
        assert_eq!(ge.get(0, 1), 1.0);
        assert!(ge.is_nodata(0, 2));
        assert_eq!(a.gt(&b).get(0, 1), 0.0);
        assert_eq!(a.eq_scalar(1.0).get(0, 0), 1.0);
    }

    #[test]
    fn select_nests_like_a_decision_tree() {
        let cond_outer = grid(1, 3, &[1.0, 0.0, 0.0]);
        let cond_inner = grid(1, 3, &[1.0, 1.0, 0.0]);
        let a = grid(1, 3, &[10.0, 10.0, 10.0]);
        let inner = Grid::select(&cond_inner, 7.0, &a);
        let out = Grid::select(&cond_outer, -1.0, &inner);
        assert_eq!(out.get(0, 0), -1.0);
        assert_eq!(out.get(0, 1), 7.0);
        assert_eq!(out.get(0, 2), 10.0);
    }

    #[test]
    fn select_on_nodata_condition_is_nodata() {
        let cond = grid(1, 1, &[f64::NAN]);
        assert!(Grid::select(&cond, 1.0, 2.0).is_nodata(0, 0));
    }

    #[test]
    fn select_ignores_losing_branch() {
        let cond = grid(1, 2, &[0.0, 1.0]);
        let zero = grid(1, 2, &[0.0, 0.0]);
        let bad = &grid(1, 2, &[1.0, 1.0]) / &zero;
        let out = Grid::select(&cond, &bad, 3.0);
        assert_eq!(out.get(0, 0), 3.0);
        assert!(out.get(0, 1).is_infinite());
    }

    #[test]
    fn extract_by_mask_blanks_outside_cells() {
        let values = grid(1, 3, &[1.0, 2.0, 3.0]);
        let mask = grid(1, 3, &[1.0, f64::NAN, 4.0]);
        let clipped = values.extract_by_mask(&mask);
        assert_eq!(clipped.get(0, 0), 1.0);
        assert!(clipped.is_nodata(0, 1));
        assert_eq!(clipped.get(0, 2), 3.0);
    }

    #[test]
    #[should_panic]
    fn mismatched_shapes_panic() {
        let _ = &grid(1, 2, &[1.0, 2.0]) + &grid(2, 1, &[1.0, 2.0]);
    }
}
