use crate::grants::{Grant, GrantProperties};
use anyhow::{Context, Result, anyhow};
use geojson::{GeoJson, Value as GeoValue};
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::time::sleep;

const MAX_RETRIES: usize = 3;

/// Loads the grant FeatureCollection from a local path or an `http(s)://`
/// URL and decodes it into grant records. The collection is read in full
/// before anything downstream runs; a failed load is an error, not a silent
/// empty map.
pub async fn load_grants(client: &Client, source: &str) -> Result<Vec<Grant>> {
    let body = if is_remote(source) {
        fetch_text_with_retry(client, source)
            .await
            .with_context(|| format!("failed to download dataset from {source}"))?
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("failed to read dataset file {source}"))?
    };
    parse_feature_collection(&body)
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

pub fn parse_feature_collection(body: &str) -> Result<Vec<Grant>> {
    let geojson: GeoJson = body.parse().context("failed to parse dataset as GeoJSON")?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(anyhow!("dataset is not a GeoJSON FeatureCollection"));
    };

    let mut grants = Vec::with_capacity(collection.features.len());
    for (idx, feature) in collection.features.into_iter().enumerate() {
        let geometry = feature
            .geometry
            .ok_or_else(|| anyhow!("feature {idx} has no geometry"))?;
        let GeoValue::Point(position) = geometry.value else {
            return Err(anyhow!("feature {idx} is not a point geometry"));
        };
        let (lon, lat) = match position.as_slice() {
            [lon, lat, ..] => (*lon, *lat),
            _ => return Err(anyhow!("feature {idx} has malformed point coordinates")),
        };
        let properties = feature
            .properties
            .ok_or_else(|| anyhow!("feature {idx} has no properties"))?;
        let properties: GrantProperties =
            serde_json::from_value(serde_json::Value::Object(properties))
                .with_context(|| format!("failed to decode properties of feature {idx}"))?;
        grants.push(Grant {
            lon,
            lat,
            properties,
        });
    }

    Ok(grants)
}

async fn fetch_text_with_retry(client: &Client, url: &str) -> Result<String> {
    send_with_retry(client, url)
        .await?
        .text()
        .await
        .with_context(|| format!("failed to read response body from {url}"))
}

async fn send_with_retry(client: &Client, url: &str) -> Result<Response> {
    let mut last_err: Option<anyhow::Error> = None;
    for attempt in 1..=MAX_RETRIES {
        match client.get(url).send().await {
            Ok(response) => match response.error_for_status() {
                Ok(success) => return Ok(success),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }

        if attempt < MAX_RETRIES {
            sleep(calculate_backoff(attempt)).await;
        }
    }

    let detail = last_err
        .as_ref()
        .map_or_else(|| "unknown error".to_string(), describe_error);
    Err(anyhow!(
        "failed to fetch {url} after {MAX_RETRIES} attempts: {detail}"
    ))
}

fn calculate_backoff(attempt: usize) -> Duration {
    const MAX_BACKOFF_EXPONENT: u32 = 10;
    let exponent = u32::try_from(attempt)
        .unwrap_or(MAX_BACKOFF_EXPONENT)
        .min(MAX_BACKOFF_EXPONENT);
    let seconds = 2_u64.saturating_pow(exponent);
    Duration::from_secs(seconds)
}

fn describe_error(error: &anyhow::Error) -> String {
    let mut pieces: Vec<String> = Vec::new();
    for (idx, cause) in error.chain().enumerate() {
        let text = cause.to_string();
        if text.is_empty() {
            continue;
        }
        if idx == 0 {
            pieces.push(text);
        } else {
            pieces.push(format!("caused by {text}"));
        }
    }

    if pieces.is_empty() {
        format!("{error:?}")
    } else {
        pieces.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grants::DEFAULT_INSTITUTION;

    const TWO_GRANTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-87.62, 41.88]},
                "properties": {
                    "YearAwarded": 1967,
                    "Institution": null,
                    "InstCity": "Chicago",
                    "InstState": "IL",
                    "AwardOutright": 12000,
                    "AppNumber": "AB-1234",
                    "ProjectTitle": null,
                    "Participants": null,
                    "Program": "Research",
                    "Division": "Humanities"
                }
            },
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-83.74, 42.28]},
                "properties": {
                    "YearAwarded": 1969,
                    "Institution": "University of Michigan",
                    "InstCity": "Ann Arbor",
                    "InstState": "MI",
                    "AwardOutright": 50000,
                    "AppNumber": 4321,
                    "ProjectTitle": "Oral History Archive",
                    "Participants": "John Smith",
                    "Program": "Education",
                    "Division": "Public Programs"
                }
            }
        ]
    }"#;

    #[test]
    fn parses_feature_collection_in_order() {
        let grants = parse_feature_collection(TWO_GRANTS).unwrap();
        assert_eq!(grants.len(), 2);
        assert!((grants[0].lon - -87.62).abs() < 1e-9);
        assert!((grants[0].lat - 41.88).abs() < 1e-9);
        assert_eq!(grants[0].properties.year_awarded, 1967);
        assert!(grants[0].properties.institution.is_none());
        assert_eq!(grants[1].properties.app_number, "4321");
        assert_eq!(
            grants[1].properties.institution.as_deref(),
            Some("University of Michigan")
        );
    }

    #[test]
    fn normalization_applies_after_parse() {
        let grants = parse_feature_collection(TWO_GRANTS).unwrap();
        let first = grants[0].clone().normalize();
        assert_eq!(first.institution, DEFAULT_INSTITUTION);
    }

    #[test]
    fn empty_collection_parses_to_no_grants() {
        let grants =
            parse_feature_collection(r#"{"type": "FeatureCollection", "features": []}"#).unwrap();
        assert!(grants.is_empty());
    }

    #[test]
    fn rejects_non_collection_documents() {
        let geometry_only = r#"{"type": "Point", "coordinates": [0.0, 0.0]}"#;
        let err = parse_feature_collection(geometry_only).unwrap_err();
        assert!(err.to_string().contains("FeatureCollection"));
    }

    #[test]
    fn rejects_non_point_features() {
        let line = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
                "properties": {}
            }]
        }"#;
        let err = parse_feature_collection(line).unwrap_err();
        assert!(err.to_string().contains("not a point"));
    }
}
