use crate::config::AppConfig;
use crate::data;
use crate::error::MapError;
use crate::fetch;
use crate::parse;
use crate::render;
use crate::types::{Disease, DiseaseSeries, MapRequest, SurveillanceReport};
use crate::week::ReportWeek;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const NO_COVID_NOTE: &str = "no COVID-19 data available";
const PAIR_FILE_NAME: &str = "COV_flu_map.html";

/// What one map generation produced, for the status line.
#[derive(Debug)]
pub struct Outcome {
    pub message: String,
}

/// The maps to draw and their colour-scale maxima, COVID-19 first.
#[derive(Debug)]
pub struct MapPlan<'a> {
    pub maps: Vec<(&'a DiseaseSeries, f64)>,
    pub notes: Vec<String>,
}

pub async fn fetch_report(date: NaiveDate, config: &AppConfig) -> Result<SurveillanceReport> {
    let week = ReportWeek::from_date(date);
    info!("Report date {} is week {} of {}", date, week.week_label(), week.year);
    let lines = fetch::fetch_week(&week, &config.source.base_url).await?;
    parse::parse_report(&lines)
}

pub fn plan_maps<'a>(
    request: &MapRequest,
    report: &'a SurveillanceReport,
    fixed_max: f64,
) -> MapPlan<'a> {
    let covid = report.covid.as_ref().filter(|s| !s.is_empty());
    let mut covid_max = covid.map(DiseaseSeries::max_value).unwrap_or(0.0);
    let mut flu_max = report.influenza.max_value();
    if request.fixed_scale_max {
        let shared = fixed_max.max(covid_max).max(flu_max);
        covid_max = shared;
        flu_max = shared;
    }

    let mut maps = Vec::new();
    let mut notes = Vec::new();
    if request.include_covid {
        match covid {
            Some(series) => maps.push((series, covid_max)),
            None => notes.push(NO_COVID_NOTE.to_string()),
        }
    }
    if request.include_flu {
        maps.push((&report.influenza, flu_max));
    }

    MapPlan { maps, notes }
}

pub fn output_file_name(plan: &MapPlan) -> String {
    match plan.maps.as_slice() {
        [(series, _)] => format!("{}map.html", series.name.replace(['/', '\\'], "_")),
        _ => PAIR_FILE_NAME.to_string(),
    }
}

pub async fn run(request: &MapRequest, config: &AppConfig) -> Result<Outcome> {
    if !request.include_covid && !request.include_flu {
        return Err(MapError::NoDiseaseSelected.into());
    }

    let report = fetch_report(request.date, config).await?;
    let plan = plan_maps(request, &report, config.render.fixed_max);
    for note in &plan.notes {
        warn!("{}", note);
    }
    if plan.maps.is_empty() {
        return Ok(Outcome {
            message: plan.notes.join("; "),
        });
    }

    let regions = data::load_regions(&config.boundaries).await?;

    let maps: Vec<String> = plan
        .maps
        .iter()
        .map(|(series, max)| {
            info!("Rendering {} ({} regions, scale max {})", series.disease, series.len(), max);
            render::render_map(series, &regions, *max, &config.render)
        })
        .collect();
    let page = render::render_page(&report.period, &maps);

    let path = write_page(&config.output.dir, &output_file_name(&plan), &page)?;

    let mut message = if config.output.open_browser {
        match open_in_browser(&path) {
            Ok(()) => format!("Map opened in browser: {}", path.display()),
            Err(e) => {
                warn!("Could not launch a browser: {:#}", e);
                format!("Map written to {}", path.display())
            }
        }
    } else {
        format!("Map written to {}", path.display())
    };
    for note in &plan.notes {
        message.push_str(" (");
        message.push_str(note);
        message.push(')');
    }

    Ok(Outcome { message })
}

fn write_page(dir: &Path, file_name: &str, page: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    let path = dir.join(file_name);
    fs::write(&path, page).with_context(|| format!("Failed to write map: {:?}", path))?;
    info!("Wrote {:?}", path);
    Ok(path)
}

fn open_in_browser(path: &Path) -> Result<()> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve map path: {:?}", path))?;
    open::that_detached(&path).with_context(|| format!("Failed to open {:?}", path))?;
    Ok(())
}

/// `disease,region,value` rows for every series in the report.
pub fn write_series_csv<W: Write>(report: &SurveillanceReport, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["disease", "region", "value"])?;

    let series = report.covid.iter().chain(std::iter::once(&report.influenza));
    for s in series {
        let disease = match s.disease {
            Disease::Covid19 => "covid19",
            Disease::Influenza => "influenza",
        };
        for row in &s.rows {
            let value = row.value.to_string();
            wtr.write_record([disease, row.region.as_str(), value.as_str()])?;
        }
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SurveillanceRow;

    fn series(disease: Disease, name: &str, rows: &[(&str, f64)]) -> DiseaseSeries {
        DiseaseSeries {
            disease,
            name: name.to_string(),
            period: "2023年第41週".to_string(),
            rows: rows
                .iter()
                .map(|(r, v)| SurveillanceRow { region: r.to_string(), value: *v })
                .collect(),
        }
    }

    fn report(with_covid: bool) -> SurveillanceReport {
        SurveillanceReport {
            period: "2023年第41週".to_string(),
            influenza: series(Disease::Influenza, "インフルエンザ", &[("東京都", 5.0), ("大阪府", 12.5)]),
            covid: with_covid
                .then(|| series(Disease::Covid19, "COVID-19", &[("東京都", 3.5), ("大阪府", 45.2)])),
        }
    }

    fn request(include_covid: bool, include_flu: bool, fixed_scale_max: bool) -> MapRequest {
        MapRequest {
            date: NaiveDate::from_ymd_opt(2023, 10, 16).unwrap(),
            include_covid,
            include_flu,
            fixed_scale_max,
        }
    }

    #[test]
    fn data_driven_maxima_are_per_disease() {
        let report = report(true);
        let plan = plan_maps(&request(true, true, false), &report, 40.0);
        assert_eq!(plan.maps.len(), 2);
        assert_eq!(plan.maps[0].0.disease, Disease::Covid19);
        assert_eq!(plan.maps[0].1, 45.2);
        assert_eq!(plan.maps[1].1, 12.5);
        assert!(plan.notes.is_empty());
        assert_eq!(output_file_name(&plan), "COV_flu_map.html");
    }

    #[test]
    fn fixed_ceiling_is_shared_and_never_below_data() {
        let report = report(true);
        let plan = plan_maps(&request(true, true, true), &report, 40.0);
        assert_eq!(plan.maps[0].1, 45.2);
        assert_eq!(plan.maps[1].1, 45.2);

        let report = report_without_outlier();
        let plan = plan_maps(&request(false, true, true), &report, 40.0);
        assert_eq!(plan.maps[0].1, 40.0);
    }

    fn report_without_outlier() -> SurveillanceReport {
        let mut r = report(true);
        r.covid.as_mut().unwrap().rows[1].value = 8.0;
        r
    }

    #[test]
    fn missing_covid_is_a_note_not_an_error() {
        let report = report(false);
        let plan = plan_maps(&request(true, true, false), &report, 40.0);
        assert_eq!(plan.maps.len(), 1);
        assert_eq!(plan.maps[0].0.disease, Disease::Influenza);
        assert_eq!(plan.notes, vec![NO_COVID_NOTE.to_string()]);
        assert_eq!(output_file_name(&plan), "インフルエンザmap.html");

        let plan = plan_maps(&request(true, false, false), &report, 40.0);
        assert!(plan.maps.is_empty());
    }

    #[test]
    fn single_covid_map_file_name() {
        let report = report(true);
        let plan = plan_maps(&request(true, false, false), &report, 40.0);
        assert_eq!(output_file_name(&plan), "COVID-19map.html");
    }

    #[tokio::test]
    async fn nothing_selected_fails_before_fetching() {
        let mut config = AppConfig::default();
        // unroutable, so any fetch attempt would surface as a different error
        config.source.base_url = "http://127.0.0.1:9".to_string();

        let err = run(&request(false, false, true), &config).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<MapError>(), Some(MapError::NoDiseaseSelected)));
    }

    #[test]
    fn series_csv_lists_both_diseases() {
        let mut out = Vec::new();
        write_series_csv(&report(true), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "disease,region,value\n\
             covid19,東京都,3.5\n\
             covid19,大阪府,45.2\n\
             influenza,東京都,5\n\
             influenza,大阪府,12.5\n"
        );
    }

    #[test]
    fn missing_page_is_not_opened() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_in_browser(&dir.path().join("absent.html")).unwrap_err();
        assert!(err.to_string().contains("Failed to resolve map path"));
    }

    #[test]
    fn writes_page_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("maps");
        let path = write_page(&nested, "x.html", "<html></html>").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "<html></html>");
    }
}
