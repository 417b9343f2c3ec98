use chrono::NaiveDate;
use geo::MultiPolygon;
use std::fmt;

/// The two diseases carried by the weekly sentinel-site feed that we map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disease {
    Covid19,
    Influenza,
}

impl fmt::Display for Disease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disease::Covid19 => write!(f, "COVID-19"),
            Disease::Influenza => write!(f, "influenza"),
        }
    }
}

/// One prefecture's reports-per-sentinel-site value for one disease.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveillanceRow {
    pub region: String,
    pub value: f64,
}

/// All usable rows for one disease in one reporting week.
///
/// Holds at most one row per region; placeholder values never make it in.
#[derive(Debug, Clone, PartialEq)]
pub struct DiseaseSeries {
    pub disease: Disease,
    /// Display name as it appears in the feed header.
    pub name: String,
    /// Free-text reporting period from the feed header.
    pub period: String,
    pub rows: Vec<SurveillanceRow>,
}

impl DiseaseSeries {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Largest value in the series, 0 when it is empty.
    pub fn max_value(&self) -> f64 {
        self.rows.iter().map(|r| r.value).fold(0.0, f64::max)
    }
}

/// Parsed contents of one weekly CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveillanceReport {
    pub period: String,
    pub influenza: DiseaseSeries,
    // Absent for weeks published before the COVID-19 columns were added.
    pub covid: Option<DiseaseSeries>,
}

/// A prefecture boundary keyed by its name.
#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// What the user asked for: one immutable value per map generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRequest {
    pub date: NaiveDate,
    pub include_covid: bool,
    pub include_flu: bool,
    pub fixed_scale_max: bool,
}
