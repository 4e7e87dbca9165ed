//! Read/write seams to the external data layer: the business catalog and the
//! interaction log. In-memory implementations back the CLI and tests, and
//! can be loaded from JSON exports of the external tables.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{RecError, RecResult};
use crate::types::{BusinessRecord, BusinessRow, InteractionEvent, InteractionRow};

pub trait CatalogSource: Send + Sync {
    /// The full catalog, used for training and catalog-wide ranking.
    fn businesses(&self) -> RecResult<Vec<BusinessRecord>>;

    /// A bounded page of the catalog for serving.
    fn page(&self, offset: usize, limit: usize) -> RecResult<Vec<BusinessRecord>> {
        Ok(self
            .businesses()?
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }
}

pub trait InteractionLog: Send + Sync {
    /// Events recorded after `cutoff`. Events without a timestamp are
    /// always returned.
    fn events_since(&self, cutoff: DateTime<Utc>) -> RecResult<Vec<InteractionEvent>>;

    fn append(&self, event: InteractionEvent) -> RecResult<()>;
}

/// Convert raw catalog rows, skipping malformed rows and repeated ids.
pub fn ingest_businesses(rows: Vec<BusinessRow>) -> Vec<BusinessRecord> {
    let total = rows.len();
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(total);

    for (position, row) in rows.into_iter().enumerate() {
        match BusinessRecord::try_from(row) {
            Ok(record) => {
                if seen.insert(record.id.clone()) {
                    records.push(record);
                } else {
                    warn!(position, business_id = %record.id, "Duplicate business id, skipping row");
                }
            }
            Err(e) => warn!(position, error = %e, "Skipping malformed business row"),
        }
    }

    debug!(total, accepted = records.len(), "Catalog rows ingested");
    records
}

/// Convert raw interaction rows, skipping malformed rows.
pub fn ingest_interactions(rows: Vec<InteractionRow>) -> Vec<InteractionEvent> {
    let total = rows.len();
    let events: Vec<InteractionEvent> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(position, row)| match InteractionEvent::try_from(row) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(position, error = %e, "Skipping malformed interaction row");
                None
            }
        })
        .collect();

    debug!(total, accepted = events.len(), "Interaction rows ingested");
    events
}

/// Read a JSON array of rows from disk.
pub fn read_json_rows<T: DeserializeOwned>(path: &Path) -> RecResult<Vec<T>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Catalog held entirely in process memory.
pub struct InMemoryCatalog {
    businesses: RwLock<Vec<BusinessRecord>>,
}

impl InMemoryCatalog {
    pub fn new(businesses: Vec<BusinessRecord>) -> Self {
        Self {
            businesses: RwLock::new(businesses),
        }
    }

    pub fn from_rows(rows: Vec<BusinessRow>) -> Self {
        Self::new(ingest_businesses(rows))
    }

    /// Load a catalog export. Malformed rows are skipped.
    pub fn load(path: &Path) -> RecResult<Self> {
        Ok(Self::from_rows(read_catalog_rows(path)?))
    }

    /// Re-read a catalog export and swap it in. On error the current
    /// catalog is kept.
    pub fn reload(&self, path: &Path) -> RecResult<usize> {
        let businesses = ingest_businesses(read_catalog_rows(path)?);
        let count = businesses.len();
        self.replace(businesses);
        info!(businesses = count, path = %path.display(), "Catalog reloaded");
        Ok(count)
    }

    pub fn replace(&self, businesses: Vec<BusinessRecord>) {
        *self.businesses.write() = businesses;
    }

    pub fn len(&self) -> usize {
        self.businesses.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.businesses.read().is_empty()
    }
}

impl CatalogSource for InMemoryCatalog {
    fn businesses(&self) -> RecResult<Vec<BusinessRecord>> {
        Ok(self.businesses.read().clone())
    }

    fn page(&self, offset: usize, limit: usize) -> RecResult<Vec<BusinessRecord>> {
        Ok(self
            .businesses
            .read()
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Append-only interaction log held in process memory.
#[derive(Default)]
pub struct InMemoryInteractionLog {
    events: RwLock<Vec<InteractionEvent>>,
}

impl InMemoryInteractionLog {
    pub fn new(events: Vec<InteractionEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub fn from_rows(rows: Vec<InteractionRow>) -> Self {
        Self::new(ingest_interactions(rows))
    }

    /// Load an interaction-log export. Malformed rows are skipped.
    pub fn load(path: &Path) -> RecResult<Self> {
        let rows: Vec<InteractionRow> = read_json_rows(path)
            .map_err(|e| RecError::InteractionLog(format!("{}: {e}", path.display())))?;
        Ok(Self::from_rows(rows))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl InteractionLog for InMemoryInteractionLog {
    fn events_since(&self, cutoff: DateTime<Utc>) -> RecResult<Vec<InteractionEvent>> {
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| e.timestamp.map_or(true, |ts| ts > cutoff))
            .cloned()
            .collect())
    }

    fn append(&self, event: InteractionEvent) -> RecResult<()> {
        self.events.write().push(event);
        Ok(())
    }
}

fn read_catalog_rows(path: &Path) -> RecResult<Vec<BusinessRow>> {
    read_json_rows(path).map_err(|e| RecError::Catalog(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionKind;
    use chrono::Duration;

    fn row(id: Option<&str>, name: Option<&str>) -> BusinessRow {
        BusinessRow {
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_ingest_skips_malformed_and_duplicates() {
        let rows = vec![
            row(Some("b1"), Some("Coffee")),
            row(None, Some("No id")),
            row(Some("b2"), None),
            row(Some("b1"), Some("Coffee again")),
            row(Some("b3"), Some("Tech")),
        ];
        let records = ingest_businesses(rows);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b3"]);
        assert_eq!(records[0].name, "Coffee");
    }

    #[test]
    fn test_ingest_interactions_skips_unknown_actions() {
        let rows = vec![
            InteractionRow {
                user_id: Some(1),
                business_id: Some("b1".to_string()),
                action: Some("purchase".to_string()),
                ..Default::default()
            },
            InteractionRow {
                user_id: Some(1),
                business_id: Some("b1".to_string()),
                action: Some("search".to_string()),
                ..Default::default()
            },
        ];
        let events = ingest_interactions(rows);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ActionKind::Purchase);
    }

    #[test]
    fn test_catalog_page() {
        let catalog = InMemoryCatalog::new(
            (0..5)
                .map(|i| BusinessRecord::new(format!("b{i}"), format!("Business {i}")))
                .collect(),
        );
        let page = catalog.page(1, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "b1");
        assert_eq!(catalog.page(4, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_log_events_since_window() {
        let now = Utc::now();
        let log = InMemoryInteractionLog::default();
        log.append(InteractionEvent::new(Some(1), "old", ActionKind::View, Some(now - Duration::days(120))))
            .unwrap();
        log.append(InteractionEvent::new(Some(1), "new", ActionKind::View, Some(now - Duration::days(1))))
            .unwrap();
        log.append(InteractionEvent::new(None, "undated", ActionKind::Click, None))
            .unwrap();

        let events = log.events_since(now - Duration::days(90)).unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.business_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "undated"]);
    }

    fn temp_file(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("bizrec-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_json_rows_errors() {
        let missing = std::env::temp_dir().join(format!("bizrec-{}.json", uuid::Uuid::new_v4()));
        assert!(matches!(
            read_json_rows::<BusinessRow>(&missing),
            Err(RecError::Io(_))
        ));

        let garbled = temp_file("[{\"id\": ");
        assert!(matches!(
            read_json_rows::<BusinessRow>(&garbled),
            Err(RecError::Serialization(_))
        ));
        let _ = std::fs::remove_file(garbled);
    }

    #[test]
    fn test_catalog_load_and_reload() {
        let path = temp_file(r#"[{"id": "b1", "name": "Coffee"}, {"id": "", "name": "Bad"}]"#);
        let catalog = InMemoryCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 1);

        std::fs::write(&path, r#"[{"id": "b1", "name": "Coffee"}, {"id": "b2", "name": "Tech"}]"#)
            .unwrap();
        assert_eq!(catalog.reload(&path).unwrap(), 2);

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(catalog.reload(&path), Err(RecError::Catalog(_))));
        assert_eq!(catalog.len(), 2);
        assert!(matches!(InMemoryCatalog::load(&path), Err(RecError::Catalog(_))));
    }

    #[test]
    fn test_interaction_log_load() {
        let path = temp_file(
            r#"[{"user_id": 1, "business_id": "b1", "action": "view"},
                {"user_id": 1, "business_id": "b1", "action": "search"}]"#,
        );
        assert_eq!(InMemoryInteractionLog::load(&path).unwrap().len(), 1);
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            InMemoryInteractionLog::load(&path),
            Err(RecError::InteractionLog(_))
        ));
        let _ = std::fs::remove_file(path);
    }
}
