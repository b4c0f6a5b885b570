//! OSC time tags.

use crate::SECONDS_FROM_1900_TO_1970;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// An OSC time tag.
///
/// A 64-bit unsigned fixed-point value: the high 32 bits are seconds since
/// 1900-01-01 00:00:00, the low 32 bits are fractional seconds in units of
/// 1/2^32. The raw value `1` is reserved as the [`IMMEDIATE`](Self::IMMEDIATE)
/// sentinel and is checked by identity before any calendar interpretation.
///
/// Immutable once constructed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct TimeTag(u64);

impl TimeTag {
    /// The reserved "dispatch immediately" sentinel.
    pub const IMMEDIATE: Self = Self(1);

    /// Creates a time tag from its raw 64-bit wire representation.
    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw 64-bit wire representation.
    #[inline(always)]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the reserved immediate sentinel.
    #[inline(always)]
    pub const fn is_immediate(&self) -> bool {
        self.0 == Self::IMMEDIATE.0
    }

    /// Creates a time tag from the current wall clock.
    ///
    /// Never produces the [`IMMEDIATE`](Self::IMMEDIATE) bit pattern: any real
    /// instant on or after 1970 has a nonzero seconds field.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self::from_unix_millis(since_epoch.as_millis() as u64)
    }

    /// Creates a time tag from milliseconds since the Unix epoch.
    pub fn from_unix_millis(millis: u64) -> Self {
        let seconds = millis / 1000 + SECONDS_FROM_1900_TO_1970;
        // Exact fixed-point scaling: frac = (ms % 1000) * 2^32 / 1000.
        let fraction = ((millis % 1000) << 32) / 1000;
        Self((seconds << 32) | (fraction & 0xFFFF_FFFF))
    }

    /// Returns the instant as milliseconds since the Unix epoch.
    ///
    /// Instants before 1970 saturate to zero. [`IMMEDIATE`](Self::IMMEDIATE) is
    /// interpreted as "now"; callers that care about the sentinel must check
    /// [`is_immediate`](Self::is_immediate) first.
    pub fn to_unix_millis(&self) -> u64 {
        if self.is_immediate() {
            return SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_millis() as u64;
        }

        let seconds_since_1900 = self.0 >> 32;
        let fraction = self.0 & 0xFFFF_FFFF;

        let seconds = seconds_since_1900.saturating_sub(SECONDS_FROM_1900_TO_1970);
        let fraction_millis = (fraction * 1000) >> 32;

        seconds.saturating_mul(1000).saturating_add(fraction_millis)
    }

    /// Returns the instant as a [`SystemTime`], with the same conventions as
    /// [`to_unix_millis`](Self::to_unix_millis).
    pub fn to_system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.to_unix_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip_within_one_ms() {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;

        let tag = TimeTag::from_unix_millis(millis);
        let back = tag.to_unix_millis();

        assert!(back.abs_diff(millis) <= 1, "{back} vs {millis}");
    }

    #[test]
    fn now_is_never_the_immediate_sentinel() {
        for _ in 0..100 {
            assert_ne!(TimeTag::now().raw(), TimeTag::IMMEDIATE.raw());
        }
    }

    #[test]
    fn immediate_is_checked_by_identity() {
        assert!(TimeTag::IMMEDIATE.is_immediate());
        assert!(!TimeTag::from_raw(2).is_immediate());
        assert!(!TimeTag::now().is_immediate());
    }

    #[test]
    fn pre_1970_tags_saturate() {
        // Seconds field below the epoch offset must not underflow.
        let tag = TimeTag::from_raw(42u64 << 32);
        assert_eq!(tag.to_unix_millis(), 0);
    }

    #[test]
    fn epoch_offset_applied() {
        let tag = TimeTag::from_unix_millis(0);
        assert_eq!(tag.raw() >> 32, SECONDS_FROM_1900_TO_1970);
        assert_eq!(tag.to_unix_millis(), 0);
    }
}
