//! Timestamped resource names.

use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;

use crate::constants::provision::NAME_TIMESTAMP_FORMAT;

/// Names of the three resources behind one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub model: String,
    pub config: String,
    pub endpoint: String,
}

impl ResourceNames {
    /// Names stamped with the given instant: `<prefix>-<kind>-<YYYY-MM-DD-HH-MM-SS>`.
    pub fn at<Tz>(prefix: &str, at: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let stamp = at.format(NAME_TIMESTAMP_FORMAT);
        Self {
            model: format!("{}-model-{}", prefix, stamp),
            config: format!("{}-config-{}", prefix, stamp),
            endpoint: format!("{}-endpoint-{}", prefix, stamp),
        }
    }

    /// Names stamped with the current local time.
    pub fn now(prefix: &str) -> Self {
        Self::at(prefix, &Local::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_names_share_one_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();
        let names = ResourceNames::at("parakeet", &at);
        assert_eq!(names.model, "parakeet-model-2025-03-07-09-05-01");
        assert_eq!(names.config, "parakeet-config-2025-03-07-09-05-01");
        assert_eq!(names.endpoint, "parakeet-endpoint-2025-03-07-09-05-01");
    }
}
