use crate::config::RenderConfig;
use crate::types::{DiseaseSeries, Region};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::{LineString, MultiPolygon, Rect};
use palette::{LinSrgb, Mix, Srgb};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt::Write;

/// ColorBrewer PuRd, 9 classes.
const PURD: [&str; 9] = [
    "#f7f4f9", "#e7e1ef", "#d4b9da", "#c994c7", "#df65b0",
    "#e7298a", "#ce1256", "#980043", "#67001f",
];

const LEGEND_HEIGHT: u32 = 10;
const MAX_LEGEND_LABELS: usize = 10;
/// Values beyond this many unit bins share the top colour.
const MAX_BINS: usize = 1000;

/// Unit-width bins from 0 up to one past the integer part of the maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    pub edges: Vec<f64>,
    pub colors: Vec<String>,
}

impl ColorScale {
    pub fn new(max_value: f64) -> Self {
        let top = if max_value.is_finite() {
            (max_value.max(0.0).floor() as usize).min(MAX_BINS - 1) + 1
        } else {
            MAX_BINS
        };
        let edges = (0..=top).map(|e| e as f64).collect();
        let colors = (0..top).map(|i| interpolate_purd(i, top)).collect();
        Self { edges, colors }
    }

    pub fn bin_count(&self) -> usize {
        self.colors.len()
    }

    pub fn color_for(&self, value: f64) -> &str {
        let bin = (value.max(0.0).floor() as usize).min(self.bin_count() - 1);
        &self.colors[bin]
    }
}

fn interpolate_purd(index: usize, count: usize) -> String {
    let t = if count > 1 {
        index as f32 / (count - 1) as f32
    } else {
        0.0
    };
    let scaled = t * (PURD.len() - 1) as f32;
    let lower = (scaled.floor() as usize).min(PURD.len() - 2);
    let factor = scaled - lower as f32;

    let mixed = hex_to_linear(PURD[lower]).mix(hex_to_linear(PURD[lower + 1]), factor);
    let rgb: Srgb = Srgb::from_linear(mixed);
    let rgb: Srgb<u8> = rgb.into_format();
    format!("#{:02x}{:02x}{:02x}", rgb.red, rgb.green, rgb.blue)
}

fn hex_to_linear(hex: &str) -> LinSrgb {
    let hex = hex.trim_start_matches('#');
    let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(0);
    let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(0);
    let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(0);
    Srgb::new(r, g, b).into_format::<f32>().into_linear()
}

/// A boundary paired with its surveillance value, if it has one.
#[derive(Debug)]
pub struct JoinedRegion<'a> {
    pub name: &'a str,
    pub geometry: &'a MultiPolygon<f64>,
    pub value: Option<f64>,
}

pub fn join_series<'a>(series: &DiseaseSeries, regions: &'a [Region]) -> Vec<JoinedRegion<'a>> {
    let values: HashMap<&str, f64> = series
        .rows
        .iter()
        .map(|r| (r.region.as_str(), r.value))
        .collect();

    regions
        .iter()
        .map(|region| JoinedRegion {
            name: &region.name,
            geometry: &region.geometry,
            value: values.get(region.name.as_str()).copied(),
        })
        .collect()
}

/// Fits Web Mercator coordinates of the regions' extent into the map box.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    origin: (f64, f64),
    scale: f64,
    offset: (f64, f64),
}

impl Projection {
    pub fn fit(regions: &[Region], width: u32, height: u32) -> Self {
        let extent = regions
            .iter()
            .filter_map(|r| r.geometry.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    geo::Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                    geo::Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
                )
            })
            .unwrap_or(Rect::new(
                geo::Coord { x: 0.0, y: 0.0 },
                geo::Coord { x: 0.0, y: 0.0 },
            ));

        // north-west and south-east corners in world units (y grows southwards)
        let (x0, y0) = mercator(extent.min().x, extent.max().y);
        let (x1, y1) = mercator(extent.max().x, extent.min().y);
        let span_x = (x1 - x0).max(f64::EPSILON);
        let span_y = (y1 - y0).max(f64::EPSILON);

        let scale = (width as f64 / span_x).min(height as f64 / span_y);
        let offset = (
            (width as f64 - span_x * scale) / 2.0,
            (height as f64 - span_y * scale) / 2.0,
        );

        Self { origin: (x0, y0), scale, offset }
    }

    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (x, y) = mercator(lon, lat);
        (
            (x - self.origin.0) * self.scale + self.offset.0,
            (y - self.origin.1) * self.scale + self.offset.1,
        )
    }
}

// Normalised Web Mercator: the whole world spans 0..1 on both axes.
fn mercator(lon: f64, lat: f64) -> (f64, f64) {
    let x = (lon + 180.0) / 360.0;
    let lat_rad = lat.to_radians();
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0;
    (x, y)
}

fn ring_path(ring: &LineString<f64>, projection: &Projection, out: &mut String) {
    let mut last: Option<(i64, i64)> = None;
    for coord in ring.coords() {
        let (x, y) = projection.project(coord.x, coord.y);
        // tenths of a pixel
        let point = ((x * 10.0).round() as i64, (y * 10.0).round() as i64);
        if last == Some(point) {
            continue;
        }
        let cmd = if last.is_none() { 'M' } else { 'L' };
        let _ = write!(out, "{}{:.1} {:.1}", cmd, point.0 as f64 / 10.0, point.1 as f64 / 10.0);
        last = Some(point);
    }
    if last.is_some() {
        out.push('Z');
    }
}

fn geometry_path(geometry: &MultiPolygon<f64>, projection: &Projection) -> String {
    let mut d = String::new();
    for polygon in geometry {
        ring_path(polygon.exterior(), projection, &mut d);
        for interior in polygon.interiors() {
            ring_path(interior, projection, &mut d);
        }
    }
    d
}

fn format_value(value: f64) -> String {
    format!("{}", value)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn tooltip(region: &JoinedRegion) -> String {
    match region.value {
        Some(v) => format!("地域: {}\n人数: {}", escape(region.name), format_value(v)),
        None => format!("地域: {}", escape(region.name)),
    }
}

fn render_legend(scale: &ColorScale, config: &RenderConfig) -> String {
    let bins = scale.bin_count();
    let width = config.legend_width as f64;
    let step = width / bins as f64;
    let label_every = (bins + MAX_LEGEND_LABELS - 1) / MAX_LEGEND_LABELS;

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg class="legend" width="{w}" height="{h}" viewBox="-10 0 {vw} {h}">"#,
        w = config.legend_width + 20,
        vw = config.legend_width + 20,
        h = LEGEND_HEIGHT + 16,
    );
    for (i, color) in scale.colors.iter().enumerate() {
        let _ = write!(
            svg,
            r#"<rect x="{:.2}" y="0" width="{:.2}" height="{}" fill="{}" fill-opacity="{}"/>"#,
            i as f64 * step,
            step,
            LEGEND_HEIGHT,
            color,
            config.fill_opacity,
        );
    }
    for (i, edge) in scale.edges.iter().enumerate() {
        if i % label_every != 0 && i != bins {
            continue;
        }
        let _ = write!(
            svg,
            r#"<text x="{:.2}" y="{}" text-anchor="middle">{}</text>"#,
            i as f64 * step,
            LEGEND_HEIGHT + 12,
            edge,
        );
    }
    svg.push_str("</svg>");
    svg
}

/// Renders one disease as a titled SVG choropleth with legend and tooltips.
pub fn render_map(
    series: &DiseaseSeries,
    regions: &[Region],
    max_value: f64,
    config: &RenderConfig,
) -> String {
    let scale = ColorScale::new(max_value);
    let projection = Projection::fit(regions, config.width, config.height);

    let mut paths = String::new();
    for region in join_series(series, regions) {
        let fill = match region.value {
            Some(v) => scale.color_for(v),
            None => config.no_data_color.as_str(),
        };
        let _ = write!(
            paths,
            r#"<path d="{d}" fill="{fill}" fill-opacity="{opacity}" stroke-width="{stroke}"><title>{title}</title></path>"#,
            d = geometry_path(region.geometry, &projection),
            fill = fill,
            opacity = config.fill_opacity,
            stroke = config.line_weight,
            title = tooltip(&region),
        );
    }

    format!(
        r#"<div class="map">
<h3 align="center" style="font-size:20px"><b>{name}定点当たり報告数</b></h3>
<h6 align="right">{period}</h6>
{legend}
<svg class="choropleth" width="{w}" height="{h}" viewBox="0 0 {w} {h}" fill-rule="evenodd">{paths}</svg>
</div>"#,
        name = escape(&series.name),
        period = escape(&series.period),
        legend = render_legend(&scale, config),
        w = config.width,
        h = config.height,
        paths = paths,
    )
}

/// Wraps rendered maps into one self-contained page, side by side.
pub fn render_page(title: &str, maps: &[String]) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="ja">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>{css}</style>
</head>
<body>
<div class="maps">
{maps}
</div>
</body>
</html>
"#,
        title = escape(title),
        css = inline_css(),
        maps = maps.join("\n"),
    )
}

fn inline_css() -> &'static str {
    r#"
body { font-family: sans-serif; margin: 0; background: #fff; }
.maps { display: flex; flex-wrap: wrap; justify-content: center; gap: 16px; }
.map { flex: 1 1 0; min-width: 320px; max-width: 50%; padding: 8px; }
.map:only-child { max-width: 100%; }
.choropleth { width: 100%; height: auto; }
.choropleth path { stroke: #555; }
.choropleth path:hover { stroke: #000; stroke-width: 2.5; }
.legend text { font-size: 10px; }
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Disease, SurveillanceRow};
    use geo::polygon;

    fn square(name: &str, lon: f64, lat: f64) -> Region {
        let p = polygon![
            (x: lon, y: lat),
            (x: lon + 1.0, y: lat),
            (x: lon + 1.0, y: lat + 1.0),
            (x: lon, y: lat + 1.0),
            (x: lon, y: lat),
        ];
        Region { name: name.to_string(), geometry: MultiPolygon::new(vec![p]) }
    }

    fn series(rows: &[(&str, f64)]) -> DiseaseSeries {
        DiseaseSeries {
            disease: Disease::Influenza,
            name: "インフルエンザ".to_string(),
            period: "2024年第3週".to_string(),
            rows: rows
                .iter()
                .map(|(r, v)| SurveillanceRow { region: r.to_string(), value: *v })
                .collect(),
        }
    }

    fn regions() -> Vec<Region> {
        vec![
            square("北海道", 141.0, 43.0),
            square("東京都", 139.0, 35.5),
            square("大阪府", 135.0, 34.5),
            square("沖縄県", 127.5, 26.0),
        ]
    }

    #[test]
    fn bins_run_to_rounded_up_maximum() {
        let scale = ColorScale::new(5.3);
        assert_eq!(scale.edges, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(scale.bin_count(), 6);

        let scale = ColorScale::new(0.0);
        assert_eq!(scale.edges, vec![0.0, 1.0]);
        assert_eq!(scale.colors, vec![PURD[0].to_string()]);
    }

    #[test]
    fn huge_maximum_is_capped() {
        let scale = ColorScale::new(1e10);
        assert_eq!(scale.bin_count(), MAX_BINS);
        assert_eq!(scale.edges.len(), MAX_BINS + 1);
        assert_eq!(scale.color_for(1e10), scale.colors[MAX_BINS - 1]);

        assert_eq!(ColorScale::new(f64::INFINITY).bin_count(), MAX_BINS);
        assert_eq!(ColorScale::new(f64::NAN).bin_count(), MAX_BINS);
    }

    #[test]
    fn palette_spans_purd() {
        let scale = ColorScale::new(39.0);
        assert_eq!(scale.bin_count(), 40);
        assert_eq!(scale.colors.first().map(String::as_str), Some(PURD[0]));
        assert_eq!(scale.colors.last().map(String::as_str), Some(PURD[8]));
    }

    #[test]
    fn values_fall_into_their_bin() {
        let scale = ColorScale::new(3.0);
        assert_eq!(scale.color_for(0.0), scale.colors[0]);
        assert_eq!(scale.color_for(2.7), scale.colors[2]);
        assert_eq!(scale.color_for(3.0), scale.colors[3]);
        assert_eq!(scale.color_for(99.0), scale.colors[3]);
    }

    #[test]
    fn join_marks_exactly_matching_regions() {
        let regions = regions();
        let s = series(&[("東京都", 5.0), ("沖縄県", 12.5), ("総数", 3.0)]);

        let joined = join_series(&s, &regions);
        assert_eq!(joined.len(), regions.len());
        assert_eq!(joined.iter().filter(|r| r.value.is_some()).count(), 2);
        assert_eq!(joined[1].value, Some(5.0));
        assert_eq!(joined[0].value, None);
    }

    #[test]
    fn tooltips_only_carry_known_values() {
        let regions = regions();
        let s = series(&[("東京都", 5.0), ("大阪府", 2.25)]);
        let html = render_map(&s, &regions, s.max_value(), &RenderConfig::default());

        assert_eq!(html.matches("<path ").count(), 4);
        assert_eq!(html.matches("人数: ").count(), 2);
        assert!(html.contains("地域: 東京都\n人数: 5</title>"));
        assert!(html.contains("地域: 大阪府\n人数: 2.25</title>"));
        assert!(html.contains("<title>地域: 北海道</title>"));
        assert!(html.contains("インフルエンザ定点当たり報告数"));
        assert!(html.contains("2024年第3週"));
    }

    #[test]
    fn projection_stays_inside_the_box() {
        let regions = regions();
        let projection = Projection::fit(&regions, 400, 300);
        for region in &regions {
            for polygon in &region.geometry {
                for c in polygon.exterior().coords() {
                    let (x, y) = projection.project(c.x, c.y);
                    assert!((-0.01..=400.01).contains(&x), "x={x}");
                    assert!((-0.01..=300.01).contains(&y), "y={y}");
                }
            }
        }
        // north is up
        let (_, north) = projection.project(141.0, 44.0);
        let (_, south) = projection.project(127.5, 26.0);
        assert!(north < south);
    }

    #[test]
    fn page_escapes_and_lays_out_maps() {
        let page = render_page("<period>", &["<div class=\"map\">a</div>".to_string(), "<div class=\"map\">b</div>".to_string()]);
        assert!(page.contains("<title>&lt;period&gt;</title>"));
        assert!(page.contains("display: flex"));
        assert_eq!(page.matches("class=\"map\"").count(), 2);
    }
}
