use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Latest position and cumulative route per order.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tracking_points")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub order_id: String,
    pub lat: f64,
    pub lng: f64,
    pub recorded_at: DateTime<Utc>,
    pub pace: String,
    #[sea_orm(column_type = "Text")]
    pub route_path: String,
    pub first_leg_len: i64,
    pub leg_offset: i64,
    pub leg_started_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
