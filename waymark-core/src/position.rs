use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use geo::{Distance, Haversine, Point};
use serde::{Deserialize, Serialize};

/// Which positioning backend produced a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gps,
    Network,
    /// Anything else a platform might report (fused providers and the like).
    #[serde(other)]
    Unknown,
}

impl ProviderKind {
    /// The backends the tracker knows how to drive.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Gps, ProviderKind::Network];
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gps => "gps",
            Self::Network => "network",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// A single location fix as reported by a platform provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Estimated error radius in meters, smaller is better.
    #[serde(rename = "accuracy")]
    pub accuracy_m: f64,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub provider: ProviderKind,
}

impl Position {
    /// Great-circle distance to another fix, in meters.
    pub fn distance_m(&self, other: &Position) -> f64 {
        Haversine::distance(self.point(), other.point())
    }

    fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }

    /// ISO-8601 timestamp with millisecond precision. Falls back to the raw
    /// millisecond count if the timestamp is outside the representable range.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp()
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(|| self.timestamp_ms.to_string())
    }

    /// Picks the more accurate of two optional fixes. The network fix takes
    /// exact accuracy ties, the GPS fix has to be strictly better.
    pub fn best_of(gps: Option<Position>, network: Option<Position>) -> Option<Position> {
        match (gps, network) {
            (Some(g), Some(n)) => Some(if g.accuracy_m < n.accuracy_m { g } else { n }),
            (g, n) => g.or(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{fix, north_of};

    #[test]
    fn distance_tracks_latitude_offsets() {
        let origin = fix(40.0, -75.0, 5.0, 0, ProviderKind::Gps);
        let moved = north_of(origin, 100.0);

        let distance = origin.distance_m(&moved);
        assert!(
            (99.0..101.0).contains(&distance),
            "100m offset measured as {distance}m",
        );
    }

    #[test]
    fn best_of_prefers_smaller_accuracy() {
        let gps = fix(1.0, 2.0, 4.0, 0, ProviderKind::Gps);
        let network = fix(3.0, 4.0, 12.0, 0, ProviderKind::Network);

        assert_eq!(Position::best_of(Some(gps), Some(network)), Some(gps));
        assert_eq!(
            Position::best_of(Some(fix(1.0, 2.0, 30.0, 0, ProviderKind::Gps)), Some(network)),
            Some(network),
        );
    }

    #[test]
    fn best_of_gives_ties_to_the_network_fix() {
        let gps = fix(1.0, 2.0, 7.0, 0, ProviderKind::Gps);
        let network = fix(3.0, 4.0, 7.0, 0, ProviderKind::Network);

        assert_eq!(Position::best_of(Some(gps), Some(network)), Some(network));
    }

    #[test]
    fn best_of_takes_whichever_side_exists() {
        let gps = fix(1.0, 2.0, 4.0, 0, ProviderKind::Gps);

        assert_eq!(Position::best_of(Some(gps), None), Some(gps));
        assert_eq!(Position::best_of(None, Some(gps)), Some(gps));
        assert_eq!(Position::best_of(None, None), None);
    }

    #[test]
    fn timestamps_render_as_iso_8601() {
        let position = fix(0.0, 0.0, 1.0, 1_700_000_000_000, ProviderKind::Gps);
        assert_eq!(position.timestamp_iso(), "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn blob_round_trips_with_wire_field_names() {
        let position = fix(12.5, -7.25, 3.5, 42, ProviderKind::Network);
        let blob = serde_json::to_string(&position).expect("Failed to encode");

        assert!(blob.contains("\"accuracy\":3.5"), "blob was {blob}");
        assert!(blob.contains("\"provider\":\"network\""), "blob was {blob}");

        let back: Position = serde_json::from_str(&blob).expect("Failed to decode");
        assert_eq!(back, position);
    }

    #[test]
    fn unrecognized_providers_decode_as_unknown() {
        let blob = r#"{"latitude":1.0,"longitude":2.0,"accuracy":3.0,"timestamp":4,"provider":"fused"}"#;
        let position: Position = serde_json::from_str(blob).expect("Failed to decode");
        assert_eq!(position.provider, ProviderKind::Unknown);
    }
}
