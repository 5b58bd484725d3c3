use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Schema,
};
use tracing::{debug, info, warn};

use super::{StoreError, TrackingStore};
use crate::entities::{delivery_rule, shipment, tracking_point, transit_hub};
use crate::geo::GeoPoint;
use crate::models::{
    DeliveryRule, Shipment, ShipmentStatus, StatusTimeline, TrackingRecord, TransitHub,
};

/// Attempts at the compare-and-set status write before giving up.
const STATUS_WRITE_ATTEMPTS: usize = 3;

/// sea-orm backed store for SQLite and Postgres.
#[derive(Debug, Clone)]
pub struct SqlTrackingStore {
    db: DatabaseConnection,
}

impl SqlTrackingStore {
    /// Connects to `database_url` and creates any missing tables.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let mut opt = ConnectOptions::new(database_url.to_string());
        opt.connect_timeout(Duration::from_secs(30))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        // Each pooled connection to an in-memory SQLite database gets its own
        // empty database.
        if database_url.contains(":memory:") {
            opt.max_connections(1).min_connections(1);
        }

        info!("Connecting tracking store to {}", redact(database_url));
        let db = Database::connect(opt).await?;
        let store = Self::new(db);
        store.create_schema().await?;
        Ok(store)
    }

    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates the four tracking tables if they do not exist yet.
    pub async fn create_schema(&self) -> Result<(), StoreError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut statements = vec![
            schema.create_table_from_entity(shipment::Entity),
            schema.create_table_from_entity(tracking_point::Entity),
            schema.create_table_from_entity(transit_hub::Entity),
            schema.create_table_from_entity(delivery_rule::Entity),
        ];
        for stmt in statements.iter_mut() {
            stmt.if_not_exists();
            self.db.execute(backend.build(&*stmt)).await?;
        }
        debug!("Tracking schema ready");
        Ok(())
    }
}

fn redact(url: &str) -> &str {
    url.split('@').last().unwrap_or(url)
}

fn parse_status(raw: &str) -> Result<ShipmentStatus, StoreError> {
    ShipmentStatus::from_str(raw)
        .map_err(|_| StoreError::Database(format!("unknown shipment status '{}'", raw)))
}

fn shipment_from_model(model: shipment::Model) -> Result<Shipment, StoreError> {
    Ok(Shipment {
        status: parse_status(&model.status)?,
        order_id: model.order_id,
        origin: GeoPoint::new(model.origin_lat, model.origin_lng),
        destination: GeoPoint::new(model.destination_lat, model.destination_lng),
        destination_address: model.destination_address,
        promised_duration: model.promised_duration,
        hub_id: model.hub_id,
        timeline: StatusTimeline {
            picked_at: model.picked_at,
            in_transit_at: model.in_transit_at,
            arrived_at_hub_at: model.arrived_at_hub_at,
            out_for_delivery_at: model.out_for_delivery_at,
            signed_at: model.signed_at,
        },
        created_at: model.created_at,
    })
}

fn shipment_to_active(shipment: &Shipment) -> shipment::ActiveModel {
    shipment::ActiveModel {
        order_id: Set(shipment.order_id.clone()),
        status: Set(shipment.status.to_string()),
        origin_lat: Set(shipment.origin.lat),
        origin_lng: Set(shipment.origin.lng),
        destination_lat: Set(shipment.destination.lat),
        destination_lng: Set(shipment.destination.lng),
        destination_address: Set(shipment.destination_address.clone()),
        promised_duration: Set(shipment.promised_duration.clone()),
        hub_id: Set(shipment.hub_id.clone()),
        picked_at: Set(shipment.timeline.picked_at),
        in_transit_at: Set(shipment.timeline.in_transit_at),
        arrived_at_hub_at: Set(shipment.timeline.arrived_at_hub_at),
        out_for_delivery_at: Set(shipment.timeline.out_for_delivery_at),
        signed_at: Set(shipment.timeline.signed_at),
        created_at: Set(shipment.created_at),
    }
}

fn tracking_from_model(model: tracking_point::Model) -> TrackingRecord {
    TrackingRecord {
        order_id: model.order_id,
        position: GeoPoint::new(model.lat, model.lng),
        recorded_at: model.recorded_at,
        pace: model.pace,
        route_path: model.route_path,
        first_leg_len: usize::try_from(model.first_leg_len).unwrap_or(0),
        leg_offset: usize::try_from(model.leg_offset).unwrap_or(0),
        leg_started_at: model.leg_started_at,
    }
}

fn hub_from_model(model: transit_hub::Model) -> TransitHub {
    TransitHub {
        id: model.id,
        name: model.name,
        location: GeoPoint::new(model.lat, model.lng),
        city_keyword: model.city_keyword,
    }
}

fn rule_from_model(model: delivery_rule::Model) -> Result<DeliveryRule, StoreError> {
    Ok(DeliveryRule {
        area: serde_json::from_str(&model.area)?,
        id: model.id,
        name: model.name,
        promised_duration: model.promised_duration,
        priority: model.priority,
    })
}

#[async_trait]
impl TrackingStore for SqlTrackingStore {
    async fn create_shipment(&self, shipment: Shipment) -> Result<Shipment, StoreError> {
        if shipment::Entity::find_by_id(shipment.order_id.clone())
            .one(&self.db)
            .await?
            .is_some()
        {
            return Err(StoreError::Duplicate(shipment.order_id));
        }

        shipment::Entity::insert(shipment_to_active(&shipment))
            .exec_without_returning(&self.db)
            .await?;
        Ok(shipment)
    }

    async fn get_shipment(&self, order_id: &str) -> Result<Option<Shipment>, StoreError> {
        shipment::Entity::find_by_id(order_id.to_string())
            .one(&self.db)
            .await?
            .map(shipment_from_model)
            .transpose()
    }

    async fn update_status(
        &self,
        order_id: &str,
        status: ShipmentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        for _ in 0..STATUS_WRITE_ATTEMPTS {
            let model = shipment::Entity::find_by_id(order_id.to_string())
                .one(&self.db)
                .await?
                .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
            let previous = model.status.clone();

            let mut shipment = shipment_from_model(model)?;
            if !shipment.advance_status(status, at) {
                return Ok(false);
            }

            let patch = shipment::ActiveModel {
                status: Set(shipment.status.to_string()),
                picked_at: Set(shipment.timeline.picked_at),
                in_transit_at: Set(shipment.timeline.in_transit_at),
                arrived_at_hub_at: Set(shipment.timeline.arrived_at_hub_at),
                out_for_delivery_at: Set(shipment.timeline.out_for_delivery_at),
                signed_at: Set(shipment.timeline.signed_at),
                ..Default::default()
            };

            // Only applies if nobody moved the status since we read it.
            let result = shipment::Entity::update_many()
                .set(patch)
                .filter(shipment::Column::OrderId.eq(order_id))
                .filter(shipment::Column::Status.eq(previous))
                .exec(&self.db)
                .await?;
            if result.rows_affected > 0 {
                return Ok(true);
            }
            debug!(order_id, %status, "status changed underneath update, retrying");
        }

        warn!(order_id, %status, "gave up on contended status update");
        Err(StoreError::Database(format!(
            "status update for {} kept conflicting",
            order_id
        )))
    }

    async fn assign_plan(
        &self,
        order_id: &str,
        promised_duration: &str,
        hub_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let patch = shipment::ActiveModel {
            promised_duration: Set(Some(promised_duration.to_string())),
            hub_id: Set(hub_id.map(str::to_string)),
            ..Default::default()
        };
        let result = shipment::Entity::update_many()
            .set(patch)
            .filter(shipment::Column::OrderId.eq(order_id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(order_id.to_string()));
        }
        Ok(())
    }

    async fn upsert_tracking_point(&self, record: TrackingRecord) -> Result<(), StoreError> {
        let active = tracking_point::ActiveModel {
            order_id: Set(record.order_id),
            lat: Set(record.position.lat),
            lng: Set(record.position.lng),
            recorded_at: Set(record.recorded_at),
            pace: Set(record.pace),
            route_path: Set(record.route_path),
            first_leg_len: Set(i64::try_from(record.first_leg_len).unwrap_or(i64::MAX)),
            leg_offset: Set(i64::try_from(record.leg_offset).unwrap_or(i64::MAX)),
            leg_started_at: Set(record.leg_started_at),
        };

        tracking_point::Entity::insert(active)
            .on_conflict(
                OnConflict::column(tracking_point::Column::OrderId)
                    .update_columns([
                        tracking_point::Column::Lat,
                        tracking_point::Column::Lng,
                        tracking_point::Column::RecordedAt,
                        tracking_point::Column::Pace,
                        tracking_point::Column::RoutePath,
                        tracking_point::Column::FirstLegLen,
                        tracking_point::Column::LegOffset,
                        tracking_point::Column::LegStartedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn get_tracking(&self, order_id: &str) -> Result<Option<TrackingRecord>, StoreError> {
        Ok(tracking_point::Entity::find_by_id(order_id.to_string())
            .one(&self.db)
            .await?
            .map(tracking_from_model))
    }

    async fn record_position(
        &self,
        order_id: &str,
        position: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let patch = tracking_point::ActiveModel {
            lat: Set(position.lat),
            lng: Set(position.lng),
            recorded_at: Set(at),
            ..Default::default()
        };
        let result = tracking_point::Entity::update_many()
            .set(patch)
            .filter(tracking_point::Column::OrderId.eq(order_id))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(order_id.to_string()));
        }
        Ok(())
    }

    async fn find_shipments_by_status(
        &self,
        statuses: &[ShipmentStatus],
    ) -> Result<Vec<Shipment>, StoreError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        shipment::Entity::find()
            .filter(shipment::Column::Status.is_in(statuses.iter().map(|s| s.to_string())))
            .order_by_asc(shipment::Column::CreatedAt)
            .order_by_asc(shipment::Column::OrderId)
            .all(&self.db)
            .await?
            .into_iter()
            .map(shipment_from_model)
            .collect()
    }

    async fn get_hub(&self, hub_id: &str) -> Result<Option<TransitHub>, StoreError> {
        Ok(transit_hub::Entity::find_by_id(hub_id.to_string())
            .one(&self.db)
            .await?
            .map(hub_from_model))
    }

    async fn list_hubs(&self) -> Result<Vec<TransitHub>, StoreError> {
        Ok(transit_hub::Entity::find()
            .order_by_asc(transit_hub::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(hub_from_model)
            .collect())
    }

    async fn upsert_hub(&self, hub: TransitHub) -> Result<(), StoreError> {
        let active = transit_hub::ActiveModel {
            id: Set(hub.id),
            name: Set(hub.name),
            lat: Set(hub.location.lat),
            lng: Set(hub.location.lng),
            city_keyword: Set(hub.city_keyword),
        };
        transit_hub::Entity::insert(active)
            .on_conflict(
                OnConflict::column(transit_hub::Column::Id)
                    .update_columns([
                        transit_hub::Column::Name,
                        transit_hub::Column::Lat,
                        transit_hub::Column::Lng,
                        transit_hub::Column::CityKeyword,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn list_delivery_rules(&self) -> Result<Vec<DeliveryRule>, StoreError> {
        delivery_rule::Entity::find()
            .order_by_asc(delivery_rule::Column::Priority)
            .order_by_asc(delivery_rule::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(rule_from_model)
            .collect()
    }

    async fn upsert_delivery_rule(&self, rule: DeliveryRule) -> Result<(), StoreError> {
        let active = delivery_rule::ActiveModel {
            area: Set(serde_json::to_string(&rule.area)?),
            id: Set(rule.id),
            name: Set(rule.name),
            promised_duration: Set(rule.promised_duration),
            priority: Set(rule.priority),
        };
        delivery_rule::Entity::insert(active)
            .on_conflict(
                OnConflict::column(delivery_rule::Column::Id)
                    .update_columns([
                        delivery_rule::Column::Name,
                        delivery_rule::Column::PromisedDuration,
                        delivery_rule::Column::Priority,
                        delivery_rule::Column::Area,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }
}
