//! GeoIP lookup service using a MaxMind GeoLite2/GeoIP2 City MMDB
//!
//! The database is memory-mapped once and shared between clones.

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use crate::analytics::models::GeoLocation;

#[derive(Clone)]
pub struct GeoIpService {
    city_reader: Option<Arc<Reader<Mmap>>>,
}

impl GeoIpService {
    /// Open the City database at `city_path`. With no path every lookup is unknown.
    pub fn new(city_path: Option<&str>) -> Result<Self> {
        let city_reader = match city_path {
            Some(path) => {
                let reader = unsafe { Reader::open_mmap(path) }
                    .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;
                Some(Arc::new(reader))
            }
            None => None,
        };

        Ok(Self { city_reader })
    }

    pub fn is_enabled(&self) -> bool {
        self.city_reader.is_some()
    }

    /// Lookup geographic location for an IP address
    pub fn lookup(&self, ip: IpAddr) -> GeoLocation {
        let mut geo_location = GeoLocation::default();

        let Some(reader) = self.city_reader.as_ref() else {
            return geo_location;
        };
        let Ok(result) = reader.lookup(ip) else {
            return geo_location;
        };

        if let Ok(Some(city)) = result.decode::<geoip2::City>() {
            geo_location.country_code = city.country.iso_code.map(|s| s.to_string());
            geo_location.country_name = city.country.names.english.map(|s| s.to_string());
            geo_location.city = city.city.names.english.map(|s| s.to_string());
        } else if let Ok(Some(country)) = result.decode::<geoip2::Country>() {
            // City records may be missing for some ranges; the country data still is.
            geo_location.country_code = country.country.iso_code.map(|s| s.to_string());
            geo_location.country_name = country.country.names.english.map(|s| s.to_string());
        }

        geo_location
    }

    /// Location label for a recorded client address.
    pub fn locate(&self, client_address: &str) -> String {
        match client_address.parse::<IpAddr>() {
            Ok(ip) => self.lookup(ip).label(),
            Err(_) => GeoLocation::default().label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::UNKNOWN_LOCATION;

    #[test]
    fn test_geoip_service_creation_invalid_path() {
        let result = GeoIpService::new(Some("/nonexistent/path.mmdb"));
        assert!(result.is_err());
    }

    #[test]
    fn test_without_database_everything_is_unknown() {
        let service = GeoIpService::new(None).unwrap();
        assert!(!service.is_enabled());
        assert_eq!(service.locate("8.8.8.8"), UNKNOWN_LOCATION);
        assert_eq!(service.locate("not-an-ip"), UNKNOWN_LOCATION);
        assert_eq!(service.locate(""), UNKNOWN_LOCATION);
    }
}
