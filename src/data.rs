use crate::config::BoundaryConfig;
use crate::types::Region;
use anyhow::{Context, Result, anyhow};
use geo::MultiPolygon;
use geojson::GeoJson;
use shapefile::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

/// Loads prefecture boundaries from a URL or a local GeoJSON / shapefile.
pub async fn load_regions(config: &BoundaryConfig) -> Result<Vec<Region>> {
    let source = config.source.as_str();

    let regions = if source.starts_with("http://") || source.starts_with("https://") {
        load_geojson_url(source, &config.join_property).await?
    } else {
        let path = Path::new(source);
        let extension = path.extension()
            .and_then(|e| e.to_str())
            .map(|s: &str| s.to_lowercase())
            .ok_or_else(|| anyhow!("Boundary file has no extension: {:?}", path))?;

        match extension.as_str() {
            "shp" => load_shapefile(path, &config.join_property)?,
            "json" | "geojson" => load_geojson_file(path, &config.join_property)?,
            _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
        }
    };

    info!("Loaded {} boundary regions", regions.len());
    Ok(regions)
}

async fn load_geojson_url(url: &str, join_property: &str) -> Result<Vec<Region>> {
    info!("Fetching boundaries from {}", url);
    let body = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("Failed to fetch boundaries: {}", url))?
        .bytes()
        .await
        .with_context(|| format!("Failed to read boundaries: {}", url))?;

    let geojson = GeoJson::from_reader(&body[..]).context("Failed to parse boundary GeoJSON")?;
    regions_from_geojson(geojson, join_property)
}

fn load_geojson_file(path: &Path, join_property: &str) -> Result<Vec<Region>> {
    info!("Loading GeoJSON from {:?}...", path);
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let reader = BufReader::new(file);

    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;
    regions_from_geojson(geojson, join_property)
}

pub fn regions_from_geojson(geojson: GeoJson, join_property: &str) -> Result<Vec<Region>> {
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut regions = Vec::new();

    for feature in collection.features {
        let name = match feature.properties.as_ref().and_then(|props| props.get(join_property)) {
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => continue, // no usable region key
        };

        let geometry = match feature.geometry {
            Some(geo) => {
                let valid_geo: geo::Geometry<f64> = geo.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry of {}: {:?}", name, e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        regions.push(Region { name, geometry });
    }

    Ok(regions)
}

fn load_shapefile(path: &Path, join_property: &str) -> Result<Vec<Region>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut regions = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let name_value = record.get(join_property)
            .ok_or_else(|| anyhow!("Join column '{}' not found in Shapefile", join_property))?;

        let name = match name_value {
            shapefile::dbase::FieldValue::Character(Some(s)) => s.trim().to_string(),
            shapefile::dbase::FieldValue::Character(None) => continue, // Skip if null
            _ => return Err(anyhow!("Shapefile join column must be a string")),
        };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue, // Skip non-polygon shapes
        };

        regions.push(Region { name, geometry });
    }

    Ok(regions)
}
