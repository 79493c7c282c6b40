//! Data models for click analytics

use serde::{Deserialize, Serialize};

/// Label used when an address cannot be placed.
pub const UNKNOWN_LOCATION: &str = "unknown";

/// Geographic location information derived from an IP address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "GB")
    pub country_code: Option<String>,

    /// Country name
    pub country_name: Option<String>,

    /// City name
    pub city: Option<String>,
}

impl GeoLocation {
    /// `"City, Country"`, `"Country"` or [`UNKNOWN_LOCATION`].
    pub fn label(&self) -> String {
        match (self.city.as_deref(), self.country_name.as_deref()) {
            (Some(city), Some(country)) if !city.is_empty() && !country.is_empty() => {
                format!("{city}, {country}")
            }
            (_, Some(country)) if !country.is_empty() => country.to_string(),
            _ => UNKNOWN_LOCATION.to_string(),
        }
    }
}
