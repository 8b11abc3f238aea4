//! Geolocation extraction from edge-injected request headers.

use axum::http::HeaderMap;

use crate::models::GeolocationRecord;

pub const CONNECTING_IP_HEADER: &str = "cf-connecting-ip";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const COUNTRY_HEADER: &str = "cf-ipcountry";
pub const REGION_HEADER: &str = "cf-region";
pub const CITY_HEADER: &str = "cf-city";
pub const TIMEZONE_HEADER: &str = "cf-timezone";
pub const LATITUDE_HEADER: &str = "cf-iplatitude";
pub const LONGITUDE_HEADER: &str = "cf-iplongitude";

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First hop of a forwarded-for chain.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    header_value(headers, FORWARDED_FOR_HEADER).and_then(|chain| {
        chain
            .split(',')
            .map(str::trim)
            .find(|hop| !hop.is_empty())
            .map(str::to_string)
    })
}

/// Build a geolocation record from request headers. Never fails: a missing
/// or unreadable header leaves its field empty.
pub fn extract_geolocation(headers: &HeaderMap) -> GeolocationRecord {
    GeolocationRecord {
        country: country_from_headers(headers),
        region: header_value(headers, REGION_HEADER),
        city: header_value(headers, CITY_HEADER),
        timezone: timezone_from_headers(headers),
        latitude: header_value(headers, LATITUDE_HEADER),
        longitude: header_value(headers, LONGITUDE_HEADER),
        ip: header_value(headers, CONNECTING_IP_HEADER).or_else(|| forwarded_ip(headers)),
    }
}

/// Edge-reported ISO country code.
pub fn country_from_headers(headers: &HeaderMap) -> Option<String> {
    header_value(headers, COUNTRY_HEADER)
}

pub fn timezone_from_headers(headers: &HeaderMap) -> Option<String> {
    header_value(headers, TIMEZONE_HEADER)
}
