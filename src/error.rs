//! Domain errors that end up in front of the user as a one-line status.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapError {
    /// The publisher redirected us away, meaning the week has no CSV yet.
    #[error("no data published for week {week} of {year}")]
    NoDataForWeek { year: i32, week: String },

    #[error("select COVID-19, influenza, or both")]
    NoDiseaseSelected,

    #[error("response body is not valid {encoding} text")]
    Decode { encoding: &'static str },

    #[error("CSV header is truncated: expected {expected} lines, found {found}")]
    TruncatedHeader { expected: usize, found: usize },
}
