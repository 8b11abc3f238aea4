use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::{GeolocationRecord, Session, SessionSummary};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignInRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "password123")]
    pub password: String,
}

/// The current session with its geolocation snapshot.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session: Session,
    pub geolocation: GeolocationRecord,
    #[schema(example = "Seattle, US")]
    pub location: String,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        let geolocation = session.geolocation();
        let location = geolocation.location_string();
        Self {
            session,
            geolocation,
            location,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeResponse {
    #[schema(example = true)]
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeAllResponse {
    #[schema(example = true)]
    pub success: bool,
    #[schema(example = 3)]
    pub revoked: u64,
}
