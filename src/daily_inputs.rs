// Daily meteorological inputs: climate records keyed by YYYYMMDD day id
use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::error::{ModelError, Result};
use crate::grid::Grid;
use crate::table_io;

pub type DayId = u32;

// One row of the daily climate table; the German column names are accepted too
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ClimateRecord {
    #[serde(alias = "Tagesid")]
    pub day_id: DayId,            // YYYYMMDD
    #[serde(alias = "Jahr")]
    pub year: i32,
    #[serde(alias = "Monat")]
    pub month: u32,               // 1..=12, selects the Haude factor
    #[serde(alias = "Tag")]
    pub day: u32,
    #[serde(alias = "RelFeu")]
    pub relative_humidity: f64,   // [%], not range checked
    #[serde(alias = "Temp")]
    pub temperature_tenths: i32,  // daily mean temperature [0.1 °C]
}

impl ClimateRecord {
    pub fn temperature_c(&self) -> f64 {
        self.temperature_tenths as f64 / 10.0
    }

    pub fn date(&self) -> Result<NaiveDate> {
        day_id_to_date(self.day_id)
    }

    // "DD.MM.YYYY" as written to the result tables
    pub fn formatted_date(&self) -> String {
        format!("{:02}.{:02}.{:04}", self.day, self.month, self.year)
    }
}

// Everything the water balance needs for one day
#[derive(Debug, Clone)]
pub struct DailyInputs {
    pub record: ClimateRecord,
    pub precipitation: Grid, // interpolated daily precipitation [mm]
}

impl DailyInputs {
    pub fn new(record: ClimateRecord, precipitation: Grid) -> Self {
        DailyInputs {
            record,
            precipitation,
        }
    }
}

/// Ordered daily climate records.
pub trait ClimateSource: Sync {
    /// Records with `start <= day_id <= end`, ascending by day id.
    fn records(&self, start: DayId, end: DayId) -> Result<Vec<ClimateRecord>>;
}

pub fn day_id_to_date(day_id: DayId) -> Result<NaiveDate> {
    let year = (day_id / 10_000) as i32;
    let month = day_id / 100 % 100;
    let day = day_id % 100;
    NaiveDate::from_ymd_opt(year, month, day).ok_or(ModelError::InvalidDayId(day_id))
}

pub fn date_to_day_id(date: NaiveDate) -> DayId {
    date.year() as DayId * 10_000 + date.month() * 100 + date.day()
}

// Day ids strictly between two days, used to report holes in the climate series
pub fn days_between(previous: DayId, next: DayId) -> Result<Vec<DayId>> {
    let mut date = day_id_to_date(previous)?;
    let last = day_id_to_date(next)?;
    let mut missing = Vec::new();
    while let Some(succ) = date.succ_opt() {
        if succ >= last {
            break;
        }
        missing.push(date_to_day_id(succ));
        date = succ;
    }
    Ok(missing)
}

// In-memory climate table, unique per day id
#[derive(Debug, Clone, Default)]
pub struct ClimateTable {
    records: BTreeMap<DayId, ClimateRecord>,
}

impl ClimateTable {
    pub fn from_records(records: impl IntoIterator<Item = ClimateRecord>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for (i, record) in records.into_iter().enumerate() {
            validate_record(&record).map_err(|message| ModelError::InvalidRecord {
                source_name: "climate records".to_string(),
                line: i + 1,
                message,
            })?;
            if table.insert(record.day_id, record).is_some() {
                return Err(ModelError::InvalidRecord {
                    source_name: "climate records".to_string(),
                    line: i + 1,
                    message: format!("duplicate day id {}", record.day_id),
                });
            }
        }
        Ok(ClimateTable { records: table })
    }

    /**
    Loads a headed CSV table with the columns
    `day_id, year, month, day, relative_humidity, temperature_tenths`
    (or `Tagesid, Jahr, Monat, Tag, RelFeu, Temp`), in any order.
    */
    pub fn from_csv(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let mut table = BTreeMap::new();
        for (line, record) in table_io::read_rows::<ClimateRecord>(path)? {
            let invalid = |message: String| ModelError::InvalidRecord {
                source_name: name.clone(),
                line,
                message,
            };
            validate_record(&record).map_err(invalid)?;
            if table.insert(record.day_id, record).is_some() {
                return Err(invalid(format!("duplicate day id {}", record.day_id)));
            }
        }
        Ok(ClimateTable { records: table })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ClimateSource for ClimateTable {
    fn records(&self, start: DayId, end: DayId) -> Result<Vec<ClimateRecord>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self.records.range(start..=end).map(|(_, r)| *r).collect())
    }
}

fn validate_record(record: &ClimateRecord) -> std::result::Result<(), String> {
    if !(1..=12).contains(&record.month) {
        return Err(format!("month {} out of range", record.month));
    }
    let date = day_id_to_date(record.day_id).map_err(|e| e.to_string())?;
    if date.year() != record.year || date.month() != record.month || date.day() != record.day {
        return Err(format!(
            "day id {} disagrees with {}-{}-{}",
            record.day_id, record.year, record.month, record.day
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(day_id: DayId) -> ClimateRecord {
        let date = day_id_to_date(day_id).unwrap();
        ClimateRecord {
            day_id,
            year: date.year(),
            month: date.month(),
            day: date.day(),
            relative_humidity: 80.0,
            temperature_tenths: 25,
        }
    }

    #[test]
    fn temperature_is_stored_in_tenths() {
        let r = ClimateRecord {
            temperature_tenths: -37,
            ..record(20030101)
        };
        assert_eq!(r.temperature_c(), -3.7);
    }

    #[test]
    fn formatted_date_is_day_month_year() {
        assert_eq!(record(20030105).formatted_date(), "05.01.2003");
    }

    #[test]
    fn day_ids_convert_both_ways() {
        let date = day_id_to_date(20040229).unwrap();
        assert_eq!(date_to_day_id(date), 20040229);
        assert!(matches!(day_id_to_date(20030229), Err(ModelError::InvalidDayId(20030229))));
    }

    #[test]
    fn finds_missing_days_across_month_end() {
        assert_eq!(days_between(20030130, 20030202).unwrap(), vec![20030131, 20030201]);
        assert!(days_between(20030101, 20030102).unwrap().is_empty());
    }

    #[test]
    fn range_query_is_inclusive_and_sorted() {
        let table = ClimateTable::from_records([
            record(20030103),
            record(20030101),
            record(20030102),
            record(20030104),
        ])
        .unwrap();
        let ids: Vec<DayId> = table
            .records(20030102, 20030104)
            .unwrap()
            .iter()
            .map(|r| r.day_id)
            .collect();
        assert_eq!(ids, vec![20030102, 20030103, 20030104]);
        assert!(table.records(20030105, 20030101).unwrap().is_empty());
    }

    #[test]
    fn rejects_duplicates_and_bad_months() {
        assert!(ClimateTable::from_records([record(20030101), record(20030101)]).is_err());
        let bad = ClimateRecord {
            month: 13,
            ..record(20030101)
        };
        assert!(ClimateTable::from_records([bad]).is_err());
    }

    #[test]
    fn loads_climate_csv() {
        let path = std::env::temp_dir().join("swm_climate_table.csv");
        std::fs::write(
            &path,
            "Tagesid,Jahr,Monat,Tag,RelFeu,Temp\n20030101,2003,1,1,85.5,-12\n20030102,2003,1,2,90,3\n",
        )
        .unwrap();
        let table = ClimateTable::from_csv(&path).unwrap();
        assert_eq!(table.len(), 2);
        let first = table.records(20030101, 20030101).unwrap()[0];
        assert_eq!(first.relative_humidity, 85.5);
        assert_eq!(first.temperature_tenths, -12);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn csv_with_inconsistent_date_is_rejected() {
        let path = std::env::temp_dir().join("swm_climate_table_bad.csv");
        std::fs::write(
            &path,
            "day_id,year,month,day,relative_humidity,temperature_tenths\n20030101,2003,2,1,85,10\n",
        )
        .unwrap();
        let err = ClimateTable::from_csv(&path).unwrap_err();
        assert!(matches!(err, ModelError::InvalidRecord { line: 2, .. }));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn csv_columns_are_matched_by_name() {
        let path = std::env::temp_dir().join("swm_climate_table_reordered.csv");
        std::fs::write(
            &path,
            "# station 4711\n\
             temperature_tenths, day_id, relative_humidity, year, month, day\n\
             171, 20030630, 62.5, 2003, 6, 30\n",
        )
        .unwrap();
        let table = ClimateTable::from_csv(&path).unwrap();
        let record = table.records(20030630, 20030630).unwrap()[0];
        assert_eq!(record.temperature_tenths, 171);
        assert_eq!(record.relative_humidity, 62.5);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn csv_with_unparsable_cell_is_rejected() {
        let path = std::env::temp_dir().join("swm_climate_table_text.csv");
        std::fs::write(
            &path,
            "day_id,year,month,day,relative_humidity,temperature_tenths\n20030101,2003,1,1,humid,10\n",
        )
        .unwrap();
        assert!(matches!(ClimateTable::from_csv(&path), Err(ModelError::Csv { .. })));
        std::fs::remove_file(&path).unwrap();
    }
}
