//! Landsat 8 `*_MTL.txt` metadata reader.
//!
//! The file is a flat list of `KEY = VALUE` lines nested in
//! `GROUP`/`END_GROUP` blocks. Group structure is ignored; keys are unique
//! across the file for everything read here.

use super::MetadataSource;
use crate::core::calibrate::CalibrationConstants;
use crate::types::{LstError, LstResult};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Parsed MTL metadata
#[derive(Debug, Clone)]
pub struct MtlMetadata {
    scene_id: String,
    pub date_acquired: NaiveDate,
    pub scene_center_time: Option<NaiveTime>,
    values: HashMap<String, String>,
}

impl MtlMetadata {
    /// Read and parse an MTL file
    pub fn from_file<P: AsRef<Path>>(path: P) -> LstResult<Self> {
        let path = path.as_ref();
        log::info!("Reading scene metadata from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse MTL text
    pub fn parse(content: &str) -> LstResult<Self> {
        let values = extract_key_values(content)?;
        log::debug!("MTL: {} keys", values.len());

        let scene_id = values
            .get("LANDSAT_SCENE_ID")
            .or_else(|| values.get("LANDSAT_PRODUCT_ID"))
            .cloned()
            .ok_or_else(|| LstError::Metadata("no LANDSAT_SCENE_ID in metadata".to_string()))?;

        let date = required(&values, "DATE_ACQUIRED")?;
        let date_acquired = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| LstError::Metadata(format!("invalid DATE_ACQUIRED '{}': {}", date, e)))?;

        let scene_center_time = values.get("SCENE_CENTER_TIME").and_then(|t| {
            let parsed = NaiveTime::parse_from_str(t.trim_end_matches('Z'), "%H:%M:%S%.f").ok();
            if parsed.is_none() {
                log::warn!("Unparseable SCENE_CENTER_TIME '{}'", t);
            }
            parsed
        });

        log::info!("Scene {} acquired {}", scene_id, date_acquired);
        Ok(Self {
            scene_id,
            date_acquired,
            scene_center_time,
            values,
        })
    }

    /// Acquisition date and centre time, when the time is known
    pub fn acquisition_time(&self) -> Option<NaiveDateTime> {
        self.scene_center_time.map(|t| self.date_acquired.and_time(t))
    }

    /// Raw value of any key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn number(&self, key: &str) -> LstResult<f64> {
        let raw = required(&self.values, key)?;
        raw.parse::<f64>()
            .map_err(|e| LstError::Metadata(format!("{} is not a number ('{}'): {}", key, raw, e)))
    }
}

impl MetadataSource for MtlMetadata {
    fn scene_id(&self) -> &str {
        &self.scene_id
    }

    fn calibration_constants(&self, band: u8) -> LstResult<CalibrationConstants> {
        let constants = CalibrationConstants::new(
            self.number(&format!("RADIANCE_MULT_BAND_{}", band))?,
            self.number(&format!("RADIANCE_ADD_BAND_{}", band))?,
            self.number(&format!("K1_CONSTANT_BAND_{}", band))?,
            self.number(&format!("K2_CONSTANT_BAND_{}", band))?,
        )?;
        log::debug!("Band {} constants: {:?}", band, constants);
        Ok(constants)
    }
}

fn required<'a>(values: &'a HashMap<String, String>, key: &str) -> LstResult<&'a str> {
    values
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| LstError::Metadata(format!("missing {} in metadata", key)))
}

/// Collect `KEY = VALUE` pairs, dropping quotes and group markers
fn extract_key_values(content: &str) -> LstResult<HashMap<String, String>> {
    let pattern = Regex::new(r#"(?m)^\s*([A-Z0-9_]+)\s*=\s*"?([^"\r\n]*?)"?\s*$"#)
        .map_err(|e| LstError::Metadata(format!("Regex error: {}", e)))?;

    let values: HashMap<String, String> = pattern
        .captures_iter(content)
        .filter(|cap| !matches!(&cap[1], "GROUP" | "END_GROUP"))
        .map(|cap| (cap[1].to_string(), cap[2].trim().to_string()))
        .collect();

    if values.is_empty() {
        return Err(LstError::Metadata("no KEY = VALUE entries found".to_string()));
    }
    Ok(values)
}
