use std::collections::BTreeMap;

use serde::Serialize;

use super::Partition;
use super::utility::pct;
use crate::model::TripRollup;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipShareRow {
    pub route_id: String,
    pub direction_id: String,
    pub trips: usize,
    pub added: usize,
    pub canceled: usize,
    pub added_pct: Option<f64>,
    pub canceled_pct: Option<f64>,
}

/// Percentage of rollups whose representative schedule relationship equals
/// the added or the canceled marker.
pub fn relationship_share(
    rollups: &[TripRollup],
    added_marker: &str,
    canceled_marker: &str,
) -> Vec<RelationshipShareRow> {
    let mut tallies: BTreeMap<Partition, (usize, usize, usize)> = BTreeMap::new();
    for rollup in rollups {
        let tally = tallies.entry(rollup.partition()).or_default();
        tally.0 += 1;
        match rollup.schedule_relationship.as_deref() {
            Some(label) if label == added_marker => tally.1 += 1,
            Some(label) if label == canceled_marker => tally.2 += 1,
            _ => {}
        }
    }

    tallies
        .into_iter()
        .map(|((route_id, direction_id), (trips, added, canceled))| RelationshipShareRow {
            route_id,
            direction_id,
            trips,
            added,
            canceled,
            added_pct: pct(added, trips),
            canceled_pct: pct(canceled, trips),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::service_delivered::test_support::rollup;

    #[test]
    fn test_shares_by_marker() {
        let mut rollups: Vec<TripRollup> = (0..8).map(|i| rollup(&format!("t{i}"), None)).collect();
        rollups[0].schedule_relationship = Some("ADDED".into());
        rollups[1].schedule_relationship = Some("CANCELED".into());
        rollups[2].schedule_relationship = Some("CANCELED".into());
        rollups[3].schedule_relationship = None;

        let rows = relationship_share(&rollups, "ADDED", "CANCELED");
        assert_eq!(rows[0].trips, 8);
        assert_eq!(rows[0].added_pct, Some(12.5));
        assert_eq!(rows[0].canceled_pct, Some(25.0));
    }

    #[test]
    fn test_markers_are_exact() {
        let mut rollups = vec![rollup("t0", None)];
        rollups[0].schedule_relationship = Some("added".into());
        let rows = relationship_share(&rollups, "ADDED", "CANCELED");
        assert_eq!(rows[0].added, 0);
    }
}
