//! Caller identity as seen by the payment API.
//!
//! Accounts live in the identity service; this service only reads the claims it signs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::UserId;

/// Account role carried in the session token.
///
/// Ownership checks deliberately ignore it: an admin paying for someone else's booking is
/// rejected like any other user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// The authenticated caller of a request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub role: Role,
}
