//! Optional geocoding capability (§6.5): `Geocode(query) -> {lat, lng,
//! precision, source, confidence} | None`. Returned precision tags are
//! normalized through `GeoPrecision::from_provider_tag` (§9) — unexpected
//! tags from the provider become `approximate` rather than an error.

use relato_common::GeoPrecision;
use serde::Deserialize;
use tracing::{debug, warn};

const GEOCODE_API_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub latitude: f64,
    pub longitude: f64,
    pub precision: GeoPrecision,
    pub formatted_address: String,
    pub place_id: String,
    pub plus_code: Option<String>,
}

pub struct Geocoder {
    http: reqwest::Client,
    api_key: String,
}

impl Geocoder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Resolve `query` to coordinates, or `None` on any failure — this
    /// capability never blocks enrichment (§4.8 Phase 2 "optionally trigger").
    pub async fn geocode(&self, query: &str) -> Option<GeocodeResult> {
        let response = self
            .http
            .get(GEOCODE_API_URL)
            .query(&[("address", query), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| warn!(error = %e, "geocoder: request failed"))
            .ok()?;

        let parsed: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| warn!(error = %e, "geocoder: response parse failed"))
            .ok()?;

        let result = parsed.results.into_iter().next()?;
        debug!(query, "geocoder: resolved");

        Some(GeocodeResult {
            latitude: result.geometry.location.lat,
            longitude: result.geometry.location.lng,
            precision: GeoPrecision::from_provider_tag(&normalize_location_type(
                &result.geometry.location_type,
            )),
            formatted_address: result.formatted_address,
            place_id: result.place_id,
            plus_code: result.plus_code.map(|p| p.global_code),
        })
    }
}

/// The provider's `location_type` values don't match the spec's precision
/// vocabulary 1:1; map the ones that do and let `GeoPrecision::from_provider_tag`
/// normalize anything else to `approximate`.
fn normalize_location_type(location_type: &str) -> String {
    match location_type {
        "ROOFTOP" => "exact".to_string(),
        "APPROXIMATE" => "approximate".to_string(),
        "GEOMETRIC_CENTER" => "neighborhood_center".to_string(),
        "RANGE_INTERPOLATED" => "city_center".to_string(),
        other => other.to_lowercase(),
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    results: Vec<GeocodeApiResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeApiResult {
    formatted_address: String,
    place_id: String,
    geometry: Geometry,
    plus_code: Option<PlusCode>,
}

#[derive(Debug, Deserialize)]
struct PlusCode {
    global_code: String,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
    location_type: String,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooftop_normalizes_to_exact() {
        assert_eq!(normalize_location_type("ROOFTOP"), "exact");
    }

    #[test]
    fn unrecognized_tag_passes_through_to_geo_precision_fallback() {
        assert_eq!(
            GeoPrecision::from_provider_tag(&normalize_location_type("SOMETHING_NEW")),
            GeoPrecision::Approximate
        );
    }
}
