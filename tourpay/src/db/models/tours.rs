//! Database models for the tour read model.

use crate::types::TourId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Database request for registering a tour
#[derive(Debug, Clone)]
pub struct TourCreateDBRequest {
    pub title: String,
    /// Price per passenger in major currency units
    pub price: Decimal,
}

/// Database response for a tour
#[derive(Debug, Clone, PartialEq)]
pub struct TourDBResponse {
    pub id: TourId,
    pub title: String,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}
