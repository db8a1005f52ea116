//! Static coefficient tables for the split-window retrieval.
//!
//! Three read-only datasets live here:
//!
//! * land cover class -> channel emissivities (Du et al. 2015, Table 3)
//!   and the FROM-GLC code legend mapping raster values onto those classes
//! * transmittance ratio -> column water vapor model (Ren et al. 2014)
//! * column water vapor subrange -> split-window coefficients b0..b7
//!   (Du et al. 2015, Table 2)
//!
//! Tables are ordered by subrange lower bound. Selection returns the first
//! entry whose closed subrange contains the value, so a value sitting on a
//! shared boundary always resolves to the lower subrange.

use crate::types::{LstError, LstResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DU_2015_CITATION: &str = "Du, Chen; Ren, Huazhong; Qin, Qiming; Meng, Jinjie; \
Zhao, Shaohua. 2015. \"A Practical Split-Window Algorithm for Estimating Land Surface \
Temperature from Landsat 8 Data.\" Remote Sens. 7, no. 1: 647-665.";

pub const REN_2014_CITATION: &str = "Ren, Huazhong; Du, Chen; Qin, Qiming; Liu, Rongyuan; \
Meng, Jinjie; Li, Jing. 2014. \"Atmospheric Water Vapor Retrieval from Landsat 8 and Its \
Validation.\" IGARSS 2014, 3045-3048.";

/// Closed interval `[lower, upper]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Subrange {
    pub lower: f64,
    pub upper: f64,
}

impl Subrange {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// First entry (in table order) whose subrange contains `value`
pub fn select_by_subrange<T>(entries: &[T], value: f64, subrange: impl Fn(&T) -> Subrange) -> Option<&T> {
    if !value.is_finite() {
        return None;
    }
    entries.iter().find(|entry| subrange(entry).contains(value))
}

/// Ensure subranges are well formed, sorted, and overlap at most on a shared boundary
fn validate_subranges(name: &str, ranges: &[Subrange]) -> LstResult<()> {
    if ranges.is_empty() {
        return Err(LstError::MissingInput(format!("{} table has no entries", name)));
    }
    for (i, range) in ranges.iter().enumerate() {
        if !(range.lower.is_finite() && range.upper.is_finite()) || range.lower > range.upper {
            return Err(LstError::ConflictingInputs(format!(
                "{} entry {} has invalid subrange [{}, {}]",
                name, i, range.lower, range.upper
            )));
        }
    }
    for (i, pair) in ranges.windows(2).enumerate() {
        if pair[1].lower < pair[0].upper {
            return Err(LstError::ConflictingInputs(format!(
                "{} entries {} and {} overlap or are out of order",
                name,
                i,
                i + 1
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Land cover emissivity
// ---------------------------------------------------------------------------

/// FROM-GLC land cover classes, plus the `Random` test selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LandCoverClass {
    Cropland,
    Forest,
    Grasslands,
    Shrublands,
    Wetlands,
    Waterbodies,
    Tundra,
    Impervious,
    Barren,
    Snow,
    /// Picks one real class once per run; sensitivity testing only
    Random,
}

impl LandCoverClass {
    /// Every class that has an emissivity record
    pub const REAL_CLASSES: [LandCoverClass; 10] = [
        LandCoverClass::Cropland,
        LandCoverClass::Forest,
        LandCoverClass::Grasslands,
        LandCoverClass::Shrublands,
        LandCoverClass::Wetlands,
        LandCoverClass::Waterbodies,
        LandCoverClass::Tundra,
        LandCoverClass::Impervious,
        LandCoverClass::Barren,
        LandCoverClass::Snow,
    ];

    pub fn is_random(&self) -> bool {
        matches!(self, LandCoverClass::Random)
    }

    /// Emissivity record for this class; `Random` has none
    pub fn emissivity(&self) -> LstResult<ClassEmissivity> {
        EMISSIVITY_TABLE
            .iter()
            .find(|entry| entry.class == *self)
            .copied()
            .ok_or_else(|| LstError::UnknownClass(self.to_string()))
    }

    /// Class for a FROM-GLC level-1 or level-2 code
    pub fn from_glc_code(code: u16) -> Option<LandCoverClass> {
        match code {
            10 | 11..=15 => Some(LandCoverClass::Cropland),
            20 | 21..=26 => Some(LandCoverClass::Forest),
            30 | 31..=33 => Some(LandCoverClass::Grasslands),
            40 | 41..=42 => Some(LandCoverClass::Shrublands),
            50 | 51..=53 => Some(LandCoverClass::Wetlands),
            60 | 61..=64 => Some(LandCoverClass::Waterbodies),
            70 | 71..=72 => Some(LandCoverClass::Tundra),
            80 | 81..=82 => Some(LandCoverClass::Impervious),
            90 | 91..=96 => Some(LandCoverClass::Barren),
            100 | 101..=102 => Some(LandCoverClass::Snow),
            _ => None,
        }
    }

    /// Level-1 FROM-GLC code
    pub fn glc_code(&self) -> Option<u16> {
        match self {
            LandCoverClass::Cropland => Some(10),
            LandCoverClass::Forest => Some(20),
            LandCoverClass::Grasslands => Some(30),
            LandCoverClass::Shrublands => Some(40),
            LandCoverClass::Wetlands => Some(50),
            LandCoverClass::Waterbodies => Some(60),
            LandCoverClass::Tundra => Some(70),
            LandCoverClass::Impervious => Some(80),
            LandCoverClass::Barren => Some(90),
            LandCoverClass::Snow => Some(100),
            LandCoverClass::Random => None,
        }
    }
}

impl std::fmt::Display for LandCoverClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LandCoverClass::Cropland => "Cropland",
            LandCoverClass::Forest => "Forest",
            LandCoverClass::Grasslands => "Grasslands",
            LandCoverClass::Shrublands => "Shrublands",
            LandCoverClass::Wetlands => "Wetlands",
            LandCoverClass::Waterbodies => "Waterbodies",
            LandCoverClass::Tundra => "Tundra",
            LandCoverClass::Impervious => "Impervious",
            LandCoverClass::Barren => "Barren",
            LandCoverClass::Snow => "Snow",
            LandCoverClass::Random => "Random",
        };
        write!(f, "{}", name)
    }
}

/// Class names are case sensitive
impl FromStr for LandCoverClass {
    type Err = LstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cropland" => Ok(LandCoverClass::Cropland),
            "Forest" => Ok(LandCoverClass::Forest),
            "Grasslands" => Ok(LandCoverClass::Grasslands),
            "Shrublands" => Ok(LandCoverClass::Shrublands),
            "Wetlands" => Ok(LandCoverClass::Wetlands),
            "Waterbodies" => Ok(LandCoverClass::Waterbodies),
            "Tundra" => Ok(LandCoverClass::Tundra),
            "Impervious" => Ok(LandCoverClass::Impervious),
            "Barren" => Ok(LandCoverClass::Barren),
            "Snow" => Ok(LandCoverClass::Snow),
            "Random" => Ok(LandCoverClass::Random),
            _ => Err(LstError::UnknownClass(s.to_string())),
        }
    }
}

/// Emissivity of TIRS channels 10 and 11 for one land cover class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassEmissivity {
    pub class: LandCoverClass,
    pub channel_10: f64,
    pub channel_11: f64,
}

impl ClassEmissivity {
    /// ε = (ε10 + ε11) / 2
    pub fn average(&self) -> f64 {
        0.5 * (self.channel_10 + self.channel_11)
    }

    /// Δε = ε10 - ε11
    pub fn delta(&self) -> f64 {
        self.channel_10 - self.channel_11
    }
}

const fn lse(class: LandCoverClass, channel_10: f64, channel_11: f64) -> ClassEmissivity {
    ClassEmissivity {
        class,
        channel_10,
        channel_11,
    }
}

pub const EMISSIVITY_TABLE: [ClassEmissivity; 10] = [
    lse(LandCoverClass::Cropland, 0.971, 0.968),
    lse(LandCoverClass::Forest, 0.995, 0.996),
    lse(LandCoverClass::Grasslands, 0.970, 0.971),
    lse(LandCoverClass::Shrublands, 0.969, 0.970),
    lse(LandCoverClass::Wetlands, 0.992, 0.998),
    lse(LandCoverClass::Waterbodies, 0.992, 0.998),
    lse(LandCoverClass::Tundra, 0.980, 0.984),
    lse(LandCoverClass::Impervious, 0.973, 0.981),
    lse(LandCoverClass::Barren, 0.969, 0.978),
    lse(LandCoverClass::Snow, 0.992, 0.998),
];

/// Emissivity record for a land cover raster sample.
///
/// `None` for no-data, non-integral or out-of-legend codes.
pub fn emissivity_for_code(code: f64) -> Option<ClassEmissivity> {
    if !code.is_finite() || code.fract() != 0.0 || code < 0.0 || code > u16::MAX as f64 {
        return None;
    }
    LandCoverClass::from_glc_code(code as u16).and_then(|class| class.emissivity().ok())
}

// ---------------------------------------------------------------------------
// Column water vapor model
// ---------------------------------------------------------------------------

/// Validated CWV domain of the coefficient tables (g/cm^2)
pub const CWV_DOMAIN: Subrange = Subrange::new(0.0, 6.3);

/// Ren et al. 2014 quadratic: CWV = c0 + c1*R + c2*R^2
pub const REN_2014_COEFFICIENTS: [f64; 3] = [-9.674, 0.653, 9.087];

/// One piece of the ratio -> CWV model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CwvModelEntry {
    /// Ratio values this polynomial is valid for
    pub ratio_subrange: Subrange,
    /// Polynomial coefficients in ascending degree
    pub coefficients: Vec<f64>,
    /// Published RMSE (g/cm^2), metadata only
    pub rmse: Option<f64>,
}

impl CwvModelEntry {
    /// Horner evaluation of the polynomial at `ratio`
    pub fn evaluate(&self, ratio: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * ratio + c)
    }
}

/// Piecewise polynomial mapping the window ratio Rji onto CWV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CwvModelRecord")]
pub struct CwvModel {
    entries: Vec<CwvModelEntry>,
    citation: String,
}

impl CwvModel {
    pub fn new(entries: Vec<CwvModelEntry>, citation: impl Into<String>) -> LstResult<Self> {
        let ranges: Vec<Subrange> = entries.iter().map(|e| e.ratio_subrange).collect();
        validate_subranges("CWV model", &ranges)?;
        if let Some(i) = entries.iter().position(|e| e.coefficients.is_empty()) {
            return Err(LstError::MissingInput(format!(
                "CWV model entry {} has no coefficients",
                i
            )));
        }
        Ok(Self {
            entries,
            citation: citation.into(),
        })
    }

    /// Single quadratic of Ren et al. 2014, restricted to ratios that map
    /// into [`CWV_DOMAIN`]
    pub fn ren_2014() -> Self {
        let [c0, c1, c2] = REN_2014_COEFFICIENTS;
        let lower = quadratic_upper_root(c2, c1, c0 - CWV_DOMAIN.lower);
        let upper = quadratic_upper_root(c2, c1, c0 - CWV_DOMAIN.upper);
        Self {
            entries: vec![CwvModelEntry {
                ratio_subrange: Subrange::new(lower, upper),
                coefficients: REN_2014_COEFFICIENTS.to_vec(),
                rmse: None,
            }],
            citation: REN_2014_CITATION.to_string(),
        }
    }

    pub fn entries(&self) -> &[CwvModelEntry] {
        &self.entries
    }

    pub fn citation(&self) -> &str {
        &self.citation
    }

    pub fn select(&self, ratio: f64) -> Option<&CwvModelEntry> {
        select_by_subrange(&self.entries, ratio, |e| e.ratio_subrange)
    }

    /// CWV for a ratio, `None` outside every subrange
    pub fn evaluate(&self, ratio: f64) -> Option<f64> {
        self.select(ratio).map(|entry| entry.evaluate(ratio))
    }
}

/// Unchecked serde form of [`CwvModel`]
#[derive(Deserialize)]
struct CwvModelRecord {
    entries: Vec<CwvModelEntry>,
    citation: String,
}

impl TryFrom<CwvModelRecord> for CwvModel {
    type Error = LstError;

    fn try_from(record: CwvModelRecord) -> Result<Self, Self::Error> {
        CwvModel::new(record.entries, record.citation)
    }
}

impl Default for CwvModel {
    fn default() -> Self {
        Self::ren_2014()
    }
}

/// Larger real root of a*x^2 + b*x + c (a > 0, positive discriminant)
fn quadratic_upper_root(a: f64, b: f64, c: f64) -> f64 {
    let discriminant = b * b - 4.0 * a * c;
    (-b + discriminant.sqrt()) / (2.0 * a)
}

// ---------------------------------------------------------------------------
// Split-window coefficients
// ---------------------------------------------------------------------------

/// Coefficients b0..b7 of the split-window equation for one CWV subrange
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitWindowCoefficients {
    pub cwv_subrange: Subrange,
    pub b: [f64; 8],
    /// Published RMSE (K)
    pub rmse: f64,
}

const fn sw(lower: f64, upper: f64, b: [f64; 8], rmse: f64) -> SplitWindowCoefficients {
    SplitWindowCoefficients {
        cwv_subrange: Subrange::new(lower, upper),
        b,
        rmse,
    }
}

/// Per-subrange coefficients. Published subranges overlap by 0.5 g/cm^2;
/// here each entry ends where the next published one would take over.
pub const SPLIT_WINDOW_TABLE: [SplitWindowCoefficients; 5] = [
    sw(0.0, 2.5, [-2.78009, 1.01408, 0.15833, -0.34991, 4.04487, 3.55414, -8.88394, 0.09152], 0.34),
    sw(2.5, 3.5, [11.00824, 0.95995, 0.17243, -0.28852, 7.11492, 0.42684, -6.62025, -0.06381], 0.60),
    sw(3.5, 4.5, [9.62610, 0.96202, 0.13834, -0.17262, 7.87883, 5.17910, -13.26611, -0.07603], 0.71),
    sw(4.5, 5.5, [0.61258, 0.99124, 0.10051, -0.09664, 7.85758, 6.86626, -15.00742, -0.01185], 0.86),
    sw(5.5, 6.3, [-0.34808, 0.98123, 0.05599, -0.03518, 11.96444, 9.06710, -14.74085, -0.20471], 0.93),
];

/// Coefficients fitted over the whole CWV domain, for unknown water vapor
pub const SPLIT_WINDOW_FULL_RANGE: SplitWindowCoefficients = sw(
    0.0,
    6.3,
    [-0.41165, 1.00522, 0.14543, -0.27297, 4.06655, -6.92512, -18.27461, 0.24468],
    0.87,
);

/// Coefficients for a CWV value, `None` outside the table
pub fn split_window_coefficients_for(cwv: f64) -> Option<&'static SplitWindowCoefficients> {
    select_by_subrange(&SPLIT_WINDOW_TABLE, cwv, |c| c.cwv_subrange)
}
