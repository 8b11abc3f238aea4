//! Geolocation snapshot derived from edge request metadata.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Sentinel returned by [`format_location_string`] when nothing is known.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Network-derived location of a client.
///
/// Every field is optional: edge metadata is absent for local development
/// and for requests that do not pass through the edge network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl GeolocationRecord {
    pub fn is_empty(&self) -> bool {
        self.country.is_none()
            && self.region.is_none()
            && self.city.is_none()
            && self.timezone.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.ip.is_none()
    }

    /// Copy that keeps only the client address.
    pub fn ip_only(&self) -> Self {
        Self {
            ip: self.ip.clone(),
            ..Self::default()
        }
    }

    pub fn location_string(&self) -> String {
        format_location_string(self)
    }
}

/// Join the known `city, region, country` parts with `", "`.
pub fn format_location_string(geolocation: &GeolocationRecord) -> String {
    let parts: Vec<&str> = [&geolocation.city, &geolocation.region, &geolocation.country]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .collect();

    if parts.is_empty() {
        UNKNOWN_LOCATION.to_string()
    } else {
        parts.join(", ")
    }
}

/// Whether `timezone` names a zone in the IANA database.
pub fn is_valid_timezone(timezone: &str) -> bool {
    timezone.parse::<chrono_tz::Tz>().is_ok()
}
