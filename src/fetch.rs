use crate::error::MapError;
use crate::week::ReportWeek;
use anyhow::{Context, Result};
use encoding_rs::SHIFT_JIS;
use tracing::info;

/// The feed is published in cp932. encoding_rs' Shift_JIS decoder is the
/// WHATWG one, which maps the Windows-31J extensions as well.
const FEED_ENCODING: &str = "cp932";

/// Downloads the weekly CSV and returns its lines, decoded.
pub async fn fetch_week(week: &ReportWeek, base_url: &str) -> Result<Vec<String>> {
    let url = week.csv_url(base_url);
    info!("request url: {}", url);

    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to request {}", url))?;
    info!("return  url: {}", response.url());

    check_not_redirected(week, &url, response.url().as_str())?;

    let response = response
        .error_for_status()
        .with_context(|| format!("Server rejected {}", url))?;
    let body = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read body of {}", url))?;

    let text = decode_cp932(&body)?;
    Ok(text.lines().map(str::to_string).collect())
}

/// A missing week is served as a redirect to a landing page rather than a 404.
pub fn check_not_redirected(week: &ReportWeek, requested: &str, returned: &str) -> Result<(), MapError> {
    if requested != returned {
        return Err(MapError::NoDataForWeek {
            year: week.year,
            week: week.week_label(),
        });
    }
    Ok(())
}

pub fn decode_cp932(bytes: &[u8]) -> Result<String, MapError> {
    let (text, _, had_errors) = SHIFT_JIS.decode(bytes);
    if had_errors {
        return Err(MapError::Decode { encoding: FEED_ENCODING });
    }
    Ok(text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_means_no_data() {
        let week = ReportWeek { year: 2024, week: 3 };
        let requested = week.csv_url("https://example.org/sokuho");

        assert!(check_not_redirected(&week, &requested, &requested).is_ok());

        let err = check_not_redirected(&week, &requested, "https://example.org/404.html").unwrap_err();
        assert!(matches!(
            err,
            MapError::NoDataForWeek { year: 2024, ref week } if week == "03"
        ));
    }

    #[test]
    fn decodes_cp932() {
        let (bytes, _, _) = SHIFT_JIS.encode("\"東京都\",\"インフルエンザ\"\r\n\"大阪府\",\"3.5\"");
        let text = decode_cp932(&bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["\"東京都\",\"インフルエンザ\"", "\"大阪府\",\"3.5\""]);
    }

    #[test]
    fn decodes_windows_31j_extensions() {
        // NEC special character "①" only exists in the cp932 superset.
        let text = decode_cp932(&[0x87, 0x40]).unwrap();
        assert_eq!(text, "①");
    }

    #[test]
    fn rejects_invalid_bytes() {
        let err = decode_cp932(&[0x82, 0xa0, 0x81]).unwrap_err();
        assert!(matches!(err, MapError::Decode { encoding: "cp932" }));
    }
}
