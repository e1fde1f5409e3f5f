//! In-memory vessel traffic tracker
//!
//! Counts distinct MMSIs seen within a sliding window and remembers the last
//! ship name announced per MMSI, so position reports (which carry no name)
//! can still be labelled. Nothing survives a restart.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info};

use crate::ais::VesselReport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficSummary {
    /// Distinct MMSIs seen within the window, including the current report
    pub recent_vessels: usize,
    /// Remembered name for a report that does not carry one itself
    pub known_name: Option<String>,
}

#[derive(Debug)]
pub struct VesselTracker {
    window: chrono::Duration,
    sightings: VecDeque<(u32, DateTime<Utc>)>,
    names: HashMap<u32, String>,
}

impl VesselTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::hours(1)),
            sightings: VecDeque::new(),
            names: HashMap::new(),
        }
    }

    /// Records a decoded report. Returns `None` for undecoded reports.
    pub fn observe(&mut self, report: &VesselReport) -> Option<TrafficSummary> {
        let mmsi = report.mmsi()?;
        let seen_at = report.received_at();

        self.sightings.push_back((mmsi, seen_at));
        let cutoff = seen_at - self.window;
        while let Some((_, t)) = self.sightings.front() {
            if *t > cutoff {
                break;
            }
            self.sightings.pop_front();
        }

        let known_name = match report.ship_name() {
            Some(name) => {
                if self.names.get(&mmsi).map(String::as_str) != Some(name) {
                    info!(mmsi, "Learned ship name '{}'", name);
                    self.names.insert(mmsi, name.to_string());
                }
                None
            }
            None => self.names.get(&mmsi).cloned(),
        };

        let recent_vessels = self
            .sightings
            .iter()
            .map(|(m, _)| *m)
            .collect::<HashSet<_>>()
            .len();
        debug!(mmsi, recent_vessels, "Traffic updated");

        Some(TrafficSummary {
            recent_vessels,
            known_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report(mmsi: u32, name: Option<&str>, minute: u32) -> VesselReport {
        let payload = match name {
            Some(n) => format!(r#"{{"mmsi":{},"type":24,"shipname":"{}"}}"#, mmsi, n),
            None => format!(r#"{{"mmsi":{},"type":1}}"#, mmsi),
        };
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
            + chrono::Duration::minutes(minute as i64);
        VesselReport::decode("ais/data", payload.as_bytes(), at)
    }

    #[test]
    fn counts_distinct_vessels_in_window() {
        let mut tracker = VesselTracker::new(Duration::from_secs(3600));
        tracker.observe(&report(1, None, 0));
        tracker.observe(&report(2, None, 10));
        tracker.observe(&report(1, None, 20));
        let summary = tracker.observe(&report(3, None, 30)).unwrap();
        assert_eq!(summary.recent_vessels, 3);

        // minute 75: sightings at 0 and 10 have expired
        let summary = tracker.observe(&report(3, None, 75)).unwrap();
        assert_eq!(summary.recent_vessels, 2);
    }

    #[test]
    fn remembers_names_for_unnamed_reports() {
        let mut tracker = VesselTracker::new(Duration::from_secs(3600));
        let named = tracker.observe(&report(7, Some("SEA BREEZE"), 0)).unwrap();
        assert_eq!(named.known_name, None);

        let unnamed = tracker.observe(&report(7, None, 1)).unwrap();
        assert_eq!(unnamed.known_name.as_deref(), Some("SEA BREEZE"));

        let stranger = tracker.observe(&report(8, None, 2)).unwrap();
        assert_eq!(stranger.known_name, None);
    }

    #[test]
    fn ignores_undecoded_reports() {
        let mut tracker = VesselTracker::new(Duration::from_secs(3600));
        let garbage = VesselReport::decode("ais/data", b"garbage", Utc::now());
        assert_eq!(tracker.observe(&garbage), None);
    }
}
