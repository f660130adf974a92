//! Subscriber entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Subscription status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberStatus {
    Active,
    Unsubscribed,
}

impl SubscriberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberStatus::Active => "active",
            SubscriberStatus::Unsubscribed => "unsubscribed",
        }
    }
}

impl From<String> for SubscriberStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => SubscriberStatus::Active,
            _ => SubscriberStatus::Unsubscribed,
        }
    }
}

impl From<SubscriberStatus> for String {
    fn from(status: SubscriberStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscribers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Lower-cased, unique
    #[sea_orm(column_type = "Text", unique)]
    pub email: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub subscribed_at: DateTimeWithTimeZone,

    pub unsubscribed_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    pub fn subscriber_status(&self) -> SubscriberStatus {
        SubscriberStatus::from(self.status.clone())
    }

    pub fn is_active(&self) -> bool {
        self.subscriber_status() == SubscriberStatus::Active
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
