pub mod geolocation;
pub mod session;

pub use geolocation::{format_location_string, is_valid_timezone, GeolocationRecord};
pub use session::{Session, SessionSummary};
