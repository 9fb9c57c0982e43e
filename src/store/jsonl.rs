use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::{ObservationQuery, ObservationStore};
use crate::model::RawTripUpdate;

/// Raw trip updates stored one JSON object per line.
///
/// `path` may be a single file or a directory, in which case every `.jsonl`
/// file in it is read in name order.
pub struct JsonLinesStore {
    path: PathBuf,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn files(&self) -> Result<Vec<PathBuf>> {
        if !tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("observation path '{}'", self.path.display()))?
            .is_dir()
        {
            return Ok(vec![self.path.clone()]);
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Parses one file's worth of lines. Blank lines are skipped; a malformed
/// line is counted and skipped without affecting the rest.
pub(crate) fn parse_lines(
    source: &Path,
    content: &str,
    query: &ObservationQuery,
) -> (Vec<RawTripUpdate>, usize) {
    let mut updates = Vec::new();
    let mut malformed = 0usize;
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawTripUpdate>(line) {
            Ok(update) if query.matches(&update) => updates.push(update),
            Ok(_) => {}
            Err(e) => {
                malformed += 1;
                debug!(file = %source.display(), line = line_no + 1, error = %e, "Skipping malformed observation");
            }
        }
    }
    (updates, malformed)
}

#[async_trait::async_trait]
impl ObservationStore for JsonLinesStore {
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    async fn trip_updates(&self, query: &ObservationQuery) -> Result<Vec<RawTripUpdate>> {
        let mut updates = Vec::new();
        let mut malformed = 0usize;

        for file in self.files().await? {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading observations from '{}'", file.display()))?;
            let (parsed, bad) = parse_lines(&file, &content, query);
            updates.extend(parsed);
            malformed += bad;
        }

        if malformed > 0 {
            warn!(malformed, "Malformed observation lines skipped");
        }
        info!(updates = updates.len(), "Observations loaded");
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::env;
    use std::fs;

    const LINES: &str = r#"{"feed":"ace","as_of":"2025-09-01T12:00:00","trip_update":{"trip":{"trip_id":"036000_A..N","route_id":"A","start_date":"20250901"}}}
this is not json
{"feed":"ace","as_of":"2025-09-01T13:00:00","trip_update":{"trip":{"trip_id":"037000_C..N","route_id":"C","start_date":"20250901"}}}

{"feed":"ace","as_of":"2025-09-01T14:00:00","trip_update":{"trip":{"trip_id":"038000_A..S","route_id":"A","direction_id":1}}}
"#;

    #[test]
    fn test_parse_lines_skips_malformed() {
        let (updates, malformed) = parse_lines(Path::new("mem"), LINES, &ObservationQuery::default());
        assert_eq!(updates.len(), 3);
        assert_eq!(malformed, 1);
    }

    #[test]
    fn test_query_filters_route_direction_and_time() {
        let query = ObservationQuery {
            route_id: Some("A".into()),
            ..Default::default()
        };
        let (updates, _) = parse_lines(Path::new("mem"), LINES, &query);
        assert_eq!(updates.len(), 2);

        let query = ObservationQuery {
            route_id: Some("A".into()),
            direction_id: Some("1".into()),
            ..Default::default()
        };
        let (updates, _) = parse_lines(Path::new("mem"), LINES, &query);
        assert_eq!(updates.len(), 1);

        let query = ObservationQuery {
            since: Some(Utc.with_ymd_and_hms(2025, 9, 1, 12, 30, 0).unwrap()),
            until: Some(Utc.with_ymd_and_hms(2025, 9, 1, 14, 0, 0).unwrap()),
            ..Default::default()
        };
        let (updates, _) = parse_lines(Path::new("mem"), LINES, &query);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].trip_update.trip.route_id.as_deref(), Some("C"));
    }

    #[tokio::test]
    async fn test_store_reads_directory() {
        let dir = env::temp_dir().join("gtfs_rt_metrics_test_jsonl");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.jsonl"), LINES).unwrap();
        fs::write(dir.join("b.jsonl"), LINES).unwrap();
        fs::write(dir.join("ignored.txt"), LINES).unwrap();

        let store = JsonLinesStore::new(&dir);
        let updates = store.trip_updates(&ObservationQuery::default()).await.unwrap();
        assert_eq!(updates.len(), 6);

        fs::remove_dir_all(&dir).unwrap();
    }
}
