use chrono::{Datelike, Duration, NaiveDate};

/// How far behind today the newest published week usually is.
const PUBLICATION_LAG_DAYS: i64 = 16;

/// A reporting week as the publisher numbers it.
///
/// Weeks are counted from the first Sunday of the year (`%U`): any days before
/// it fall into week 00. This is not ISO week numbering, and the remote URL
/// scheme depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportWeek {
    pub year: i32,
    pub week: u32,
}

impl ReportWeek {
    pub fn from_date(date: NaiveDate) -> Self {
        let week = (date.ordinal0() + 7 - date.weekday().num_days_from_sunday()) / 7;
        Self {
            year: date.year(),
            week,
        }
    }

    /// Zero-padded two digit week label.
    pub fn week_label(&self) -> String {
        format!("{:02}", self.week)
    }

    pub fn csv_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        let week = self.week_label();
        format!(
            "{base}/idwr-{year}/{year}{week}/{year}-{week}-teiten.csv",
            year = self.year
        )
    }
}

pub fn default_report_date(today: NaiveDate) -> NaiveDate {
    today - Duration::days(PUBLICATION_LAG_DAYS)
}
