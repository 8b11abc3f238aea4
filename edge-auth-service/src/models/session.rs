//! Session model - bearer-token sessions carrying a geolocation snapshot.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::geolocation::{format_location_string, GeolocationRecord};

/// Session entity. Column names are the storage wire contract.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[sqlx(rename = "userId")]
    pub user_id: String,
    #[serde(skip)]
    pub token: String,
    #[sqlx(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
    #[sqlx(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[sqlx(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[sqlx(rename = "ipAddress")]
    pub ip_address: Option<String>,
    #[sqlx(rename = "userAgent")]
    pub user_agent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl Session {
    /// Create a new session starting at `now`.
    pub fn new(
        user_id: String,
        token: String,
        geolocation: &GeolocationRecord,
        user_agent: Option<String>,
        lifetime: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            token,
            expires_at: now + lifetime,
            created_at: now,
            updated_at: now,
            ip_address: geolocation.ip.clone(),
            user_agent,
            country: geolocation.country.clone(),
            region: geolocation.region.clone(),
            city: geolocation.city.clone(),
            timezone: geolocation.timezone.clone(),
            latitude: geolocation.latitude.clone(),
            longitude: geolocation.longitude.clone(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// True once `now` has entered the last `update_age` of the lifetime.
    pub fn needs_renewal(&self, now: DateTime<Utc>, update_age: Duration) -> bool {
        self.expires_at - update_age <= now
    }

    /// Geolocation captured when the session was created.
    pub fn geolocation(&self) -> GeolocationRecord {
        GeolocationRecord {
            country: self.country.clone(),
            region: self.region.clone(),
            city: self.city.clone(),
            timezone: self.timezone.clone(),
            latitude: self.latitude.clone(),
            longitude: self.longitude.clone(),
            ip: self.ip_address.clone(),
        }
    }
}

/// Session as shown in a user's device list.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub location: String,
    pub is_current: bool,
}

impl SessionSummary {
    pub fn from_session(session: Session, current_token: Option<&str>) -> Self {
        let location = format_location_string(&session.geolocation());
        let is_current = current_token.is_some_and(|token| token == session.token);
        Self {
            id: session.id,
            created_at: session.created_at,
            expires_at: session.expires_at,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            country: session.country,
            region: session.region,
            city: session.city,
            timezone: session.timezone,
            location,
            is_current,
        }
    }
}
