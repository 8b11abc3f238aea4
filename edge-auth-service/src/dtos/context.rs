use serde::Serialize;
use utoipa::ToSchema;

use crate::models::GeolocationRecord;

/// Edge context as seen for the current request.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextResponse {
    pub geolocation: GeolocationRecord,
    #[schema(example = "Paris, FR")]
    pub location: String,
    /// Whether the reported timezone is a known IANA zone.
    pub timezone_valid: bool,
    pub authenticated: bool,
}
