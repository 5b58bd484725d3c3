use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::{RouteProvider, RoutingError};
use crate::geo::GeoPoint;

/// Driving-route client for an OSRM `route/v1/driving` endpoint.
#[derive(Debug, Clone)]
pub struct OsrmRouteProvider {
    client: Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct OsrmRouteResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: `[lng, lat]`.
    coordinates: Vec<[f64; 2]>,
}

impl OsrmRouteProvider {
    /// Client for `endpoint`, e.g. `http://localhost:5000`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RoutingError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn route_url(&self, origin: &GeoPoint, destination: &GeoPoint) -> Result<Url, RoutingError> {
        let base = format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}",
            self.endpoint, origin.lng, origin.lat, destination.lng, destination.lat
        );
        let mut url = Url::parse(&base)
            .map_err(|err| RoutingError::Api(format!("failed to build OSRM URL: {}", err)))?;
        url.query_pairs_mut()
            .append_pair("overview", "full")
            .append_pair("geometries", "geojson");
        Ok(url)
    }
}

#[async_trait]
impl RouteProvider for OsrmRouteProvider {
    async fn driving_path(
        &self,
        origin: &GeoPoint,
        destination: &GeoPoint,
    ) -> Result<Vec<GeoPoint>, RoutingError> {
        let url = self.route_url(origin, destination)?;
        debug!(%url, "requesting driving route");

        let parsed: OsrmRouteResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if parsed.code != "Ok" {
            return Err(RoutingError::Api(format!(
                "{}: {}",
                parsed.code,
                parsed.message.unwrap_or_default()
            )));
        }

        let path: Vec<GeoPoint> = parsed
            .routes
            .into_iter()
            .next()
            .map(|route| {
                route
                    .geometry
                    .coordinates
                    .into_iter()
                    .map(|[lng, lat]| GeoPoint::new(lat, lng))
                    .collect()
            })
            .unwrap_or_default();

        if path.is_empty() {
            return Err(RoutingError::EmptyRoute);
        }
        Ok(path)
    }
}
