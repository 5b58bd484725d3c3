use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use validator::Validate;

use crate::{
    dispatch::ShipPlan,
    errors::ServiceError,
    geo::GeoPoint,
    models::{NewShipment, Shipment, TrackingRecord},
    ApiResponse, ApiResult, AppState,
};

/// Latest tracking state with the route decoded for map rendering.
#[derive(Debug, Serialize)]
pub struct TrackingView {
    pub position: GeoPoint,
    pub recorded_at: DateTime<Utc>,
    pub pace: String,
    pub route_path: Vec<GeoPoint>,
    pub leg_offset: usize,
    pub leg_started_at: Option<DateTime<Utc>>,
}

impl TryFrom<TrackingRecord> for TrackingView {
    type Error = ServiceError;

    fn try_from(record: TrackingRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            route_path: record.route()?,
            position: record.position,
            recorded_at: record.recorded_at,
            pace: record.pace,
            leg_offset: record.leg_offset,
            leg_started_at: record.leg_started_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ShipmentDetail {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub tracking: Option<TrackingView>,
}

pub async fn create_shipment(
    State(state): State<AppState>,
    Json(payload): Json<NewShipment>,
) -> Result<(StatusCode, Json<ApiResponse<Shipment>>), ServiceError> {
    payload.validate()?;

    let now = state.orchestrator.clock().now();
    let created = state
        .store
        .create_shipment(payload.into_shipment(now))
        .await?;
    info!(order_id = %created.order_id, "shipment registered");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn ship_shipment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<ShipPlan> {
    let plan = state.orchestrator.ship(&order_id).await?;
    Ok(Json(ApiResponse::success(plan)))
}

pub async fn get_shipment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<ShipmentDetail> {
    let shipment = state
        .store
        .get_shipment(&order_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Shipment {} not found", order_id)))?;

    let tracking = match state.store.get_tracking(&order_id).await? {
        Some(record) => Some(TrackingView::try_from(record)?),
        None => None,
    };

    Ok(Json(ApiResponse::success(ShipmentDetail { shipment, tracking })))
}
