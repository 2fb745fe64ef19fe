//! Common type definitions.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: account that owns bookings (issued by the identity collaborator)
//! - [`TourId`]: tour read model identifier
//! - [`BookingId`]: booking identifier
//! - [`PaymentId`]: payment attempt identifier, also used as the gateway transaction reference
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type TourId = Uuid;
pub type BookingId = Uuid;
pub type PaymentId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}
