/*!
ESRI ASCII grid (`.asc`) reading and writing, and the directory-backed grid
source and writer built on it.
*/
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{ModelError, Result};
use crate::grid::{Grid, GridGeometry};

pub const NODATA_VALUE: f64 = -9999.0;

/// Read-only access to named input rasters.
pub trait GridSource: Sync {
    fn load(&self, name: &str) -> Result<Grid>;
}

/// Destination for grids a run was asked to keep.
pub trait GridWriter: Sync {
    fn write(&self, name: &str, grid: &Grid) -> Result<()>;
}

// Grid source reading <dir>/<name>.asc
#[derive(Debug, Clone)]
pub struct DirectoryGridSource {
    dir: PathBuf,
}

impl DirectoryGridSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectoryGridSource { dir: dir.into() }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.asc"))
    }
}

impl GridSource for DirectoryGridSource {
    fn load(&self, name: &str) -> Result<Grid> {
        let path = self.path_of(name);
        if !path.is_file() {
            return Err(ModelError::GridNotFound {
                name: name.to_string(),
                path,
            });
        }
        read_ascii_grid(&path)
    }
}

// Grid writer storing <dir>/<name>.asc
#[derive(Debug, Clone)]
pub struct AsciiGridDirectory {
    dir: PathBuf,
}

impl AsciiGridDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        AsciiGridDirectory { dir: dir.into() }
    }
}

impl GridWriter for AsciiGridDirectory {
    fn write(&self, name: &str, grid: &Grid) -> Result<()> {
        let path = self.dir.join(format!("{name}.asc"));
        debug!("writing grid {}", path.display());
        write_ascii_grid(&path, grid)
    }
}

pub fn read_ascii_grid(path: &Path) -> Result<Grid> {
    let text = fs::read_to_string(path).map_err(|e| ModelError::io(path, e))?;
    parse_ascii_grid(&text).map_err(|message| ModelError::GridParse {
        path: path.to_path_buf(),
        message,
    })
}

pub fn write_ascii_grid(path: &Path, grid: &Grid) -> Result<()> {
    fs::write(path, format_ascii_grid(grid)).map_err(|e| ModelError::io(path, e))
}

pub fn parse_ascii_grid(text: &str) -> std::result::Result<Grid, String> {
    let mut ncols = None;
    let mut nrows = None;
    let mut xll = None;
    let mut yll = None;
    let mut x_is_center = false;
    let mut y_is_center = false;
    let mut cell_size = None;
    let mut nodata = None;

    let mut lines = text.lines().enumerate().peekable();
    while let Some(&(_, line)) = lines.peek() {
        let mut parts = line.split_whitespace();
        let Some(key) = parts.next() else {
            lines.next();
            continue;
        };
        // the first line starting with a number opens the data block
        if key.parse::<f64>().is_ok() {
            break;
        }
        let value = parts
            .next()
            .ok_or_else(|| format!("header key '{key}' has no value"))?;
        let number = value
            .parse::<f64>()
            .map_err(|_| format!("header '{key}' has non-numeric value '{value}'"))?;
        match key.to_lowercase().as_str() {
            "ncols" => ncols = Some(number as usize),
            "nrows" => nrows = Some(number as usize),
            "xllcorner" => xll = Some(number),
            "xllcenter" => {
                xll = Some(number);
                x_is_center = true;
            }
            "yllcorner" => yll = Some(number),
            "yllcenter" => {
                yll = Some(number);
                y_is_center = true;
            }
            "cellsize" => cell_size = Some(number),
            "nodata_value" => nodata = Some(number),
            other => return Err(format!("unknown header key '{other}'")),
        }
        lines.next();
    }

    let ncols = ncols.ok_or("missing ncols")?;
    let nrows = nrows.ok_or("missing nrows")?;
    let cell_size = cell_size.ok_or("missing cellsize")?;
    let mut xll = xll.ok_or("missing xllcorner")?;
    let mut yll = yll.ok_or("missing yllcorner")?;
    if x_is_center {
        xll -= cell_size / 2.0;
    }
    if y_is_center {
        yll -= cell_size / 2.0;
    }

    let mut values = Vec::with_capacity(nrows * ncols);
    for (line_no, line) in lines {
        for token in line.split_whitespace() {
            let v = token
                .parse::<f64>()
                .map_err(|_| format!("line {}: bad cell value '{token}'", line_no + 1))?;
            values.push(match nodata {
                Some(nd) if v == nd => f64::NAN,
                _ => v,
            });
        }
    }
    if values.len() != nrows * ncols {
        return Err(format!(
            "expected {} cell values ({nrows} x {ncols}), found {}",
            nrows * ncols,
            values.len()
        ));
    }

    let geometry = GridGeometry::new(nrows, ncols, xll, yll, cell_size);
    Grid::from_row_slice(geometry, &values).map_err(|e| e.to_string())
}

pub fn format_ascii_grid(grid: &Grid) -> String {
    let g = grid.geometry();
    let mut out = format!(
        "ncols {}\nnrows {}\nxllcorner {}\nyllcorner {}\ncellsize {}\nNODATA_value {}\n",
        g.ncols, g.nrows, g.xll_corner, g.yll_corner, g.cell_size, NODATA_VALUE
    );
    for row in 0..g.nrows {
        let line: Vec<String> = (0..g.ncols)
            .map(|col| {
                let v = grid.get(row, col);
                if v.is_nan() {
                    NODATA_VALUE.to_string()
                } else {
                    v.to_string()
                }
            })
            .collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }
    out
}
