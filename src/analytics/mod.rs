//! Click analytics
//!
//! Client addresses are resolved once per request (see [`ip_extractor`]) and
//! stored raw with each access event. Locations are derived at report time.

pub mod geoip;
pub mod ip_extractor;
pub mod models;

pub use geoip::GeoIpService;
pub use ip_extractor::extract_client_ip;
pub use models::GeoLocation;

use std::collections::BTreeMap;

use crate::models::ClickRecord;

/// Count clicks per location label.
pub fn location_report(geoip: &GeoIpService, clicks: &[ClickRecord]) -> BTreeMap<String, u64> {
    let mut report = BTreeMap::new();
    for click in clicks {
        *report.entry(geoip.locate(&click.client_address)).or_insert(0) += 1;
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(id: i64, client_address: &str) -> ClickRecord {
        ClickRecord {
            id,
            short_code: "abc".to_string(),
            client_address: client_address.to_string(),
            user_agent: "test".to_string(),
            clicked_at: 0,
        }
    }

    #[test]
    fn test_report_without_database_groups_under_unknown() {
        let geoip = GeoIpService::new(None).unwrap();
        let clicks = vec![click(1, "1.1.1.1"), click(2, "2001:db8::1"), click(3, "")];

        let report = location_report(&geoip, &clicks);
        assert_eq!(report.len(), 1);
        assert_eq!(report["unknown"], 3);
    }

    #[test]
    fn test_empty_report() {
        let geoip = GeoIpService::new(None).unwrap();
        assert!(location_report(&geoip, &[]).is_empty());
    }
}
