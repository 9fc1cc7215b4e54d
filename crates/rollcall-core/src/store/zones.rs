//! Fixed-offset time-zone service.
//!
//! Platform zone codes map to a constant UTC offset in minutes. Daylight
//! saving is not modelled; deployments that need it plug in their own
//! [`TimeZoneService`].

use chrono::{FixedOffset, NaiveDateTime, TimeZone as _};
use std::collections::BTreeMap;

use super::{StoreError, TimeZoneService};

/// Zone codes known out of the box (code, offset in minutes).
pub const DEFAULT_ZONES: &[(i32, i32)] = &[
    (4, -480),  // Pacific
    (10, -420), // Mountain
    (20, -360), // Central
    (35, -300), // Eastern
    (85, 0),    // GMT
    (110, 60),  // W. Europe
    (190, 330), // India
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedOffsetZones {
    offsets: BTreeMap<i32, i32>,
}

impl Default for FixedOffsetZones {
    fn default() -> Self {
        Self {
            offsets: DEFAULT_ZONES.iter().copied().collect(),
        }
    }
}

impl FixedOffsetZones {
    /// Default zones overlaid with `overrides` (code → minutes east of UTC).
    #[must_use]
    pub fn with_overrides(overrides: impl IntoIterator<Item = (i32, i32)>) -> Self {
        let mut zones = Self::default();
        zones.offsets.extend(overrides);
        zones
    }

    #[must_use]
    pub fn offset_minutes(&self, zone_code: i32) -> Option<i32> {
        self.offsets.get(&zone_code).copied()
    }
}

impl TimeZoneService for FixedOffsetZones {
    fn local_time(&self, utc: NaiveDateTime, zone_code: i32) -> Result<NaiveDateTime, StoreError> {
        let offset = self
            .offset_minutes(zone_code)
            .and_then(|minutes| minutes.checked_mul(60))
            .and_then(FixedOffset::east_opt)
            .ok_or(StoreError::UnknownZone(zone_code))?;
        Ok(offset.from_utc_datetime(&utc).naive_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn converts_with_fixed_offset() {
        let zones = FixedOffsetZones::default();
        assert_eq!(zones.local_time(at(12, 0), 190).expect("india"), at(17, 30));
        assert_eq!(zones.local_time(at(12, 0), 35).expect("eastern"), at(7, 0));
        assert_eq!(zones.local_time(at(12, 0), 85).expect("gmt"), at(12, 0));
    }

    #[test]
    fn unknown_zone_is_an_error() {
        let err = FixedOffsetZones::default()
            .local_time(at(0, 0), 9999)
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownZone(9999)));
    }

    #[test]
    fn out_of_range_offsets_are_unknown_zones() {
        let zones = FixedOffsetZones::with_overrides([(600, i32::MAX), (601, 24 * 60)]);
        assert!(matches!(
            zones.local_time(at(0, 0), 600).unwrap_err(),
            StoreError::UnknownZone(600)
        ));
        assert!(matches!(
            zones.local_time(at(0, 0), 601).unwrap_err(),
            StoreError::UnknownZone(601)
        ));
    }

    #[test]
    fn overrides_replace_defaults() {
        let zones = FixedOffsetZones::with_overrides([(85, 60), (500, -30)]);
        assert_eq!(zones.offset_minutes(85), Some(60));
        assert_eq!(zones.local_time(at(10, 0), 500).expect("custom"), at(9, 30));
    }
}
