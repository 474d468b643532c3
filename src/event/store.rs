use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ParseError, StoreError};
use crate::event::event_model::{DeviceInfo, Event, EventKind, Session};

/// Session-scoped, in-memory event store. Events are kept sorted by
/// `(timestamp_ms, seq)` where `seq` is a store-wide insertion counter.
#[derive(Debug, Default)]
pub struct EventStore {
    sessions: BTreeMap<String, Session>,
    next_seq: u64,
}

/// Result of a bulk import. Malformed records are counted, never fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub imported: usize,
    pub skipped: usize,
    pub sessions_created: usize,
    /// One message per skipped record
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub sessions: usize,
    pub sealed_sessions: usize,
    pub events: usize,
    pub by_kind: BTreeMap<EventKind, usize>,
}

/// `{ "device_info": {..}, "events": [..] }` export document.
#[derive(Debug, Deserialize)]
struct ExportDocument {
    #[serde(default, alias = "deviceInfo")]
    device_info: Option<DeviceInfo>,
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_session(
        &mut self,
        session_id: &str,
        device_info: DeviceInfo,
    ) -> Result<&Session, StoreError> {
        if self.sessions.contains_key(session_id) {
            return Err(StoreError::DuplicateSession(session_id.to_string()));
        }
        debug!(session_id, "opening session");
        let session = Session::new(session_id, Utc::now(), device_info);
        Ok(self.sessions.entry(session_id.to_string()).or_insert(session))
    }

    /// Append one event. The event's own `session_id` must match. Returns the
    /// assigned sequence number.
    pub fn append(&mut self, session_id: &str, mut event: Event) -> Result<u64, StoreError> {
        if event.session_id != session_id {
            return Err(StoreError::SessionMismatch {
                session: session_id.to_string(),
                event: event.session_id,
            });
        }
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))?;
        if session.sealed {
            return Err(StoreError::SessionSealed(session_id.to_string()));
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        event.seq = seq;

        // seq is monotonic, so an equal timestamp always sorts after existing events.
        let pos = session
            .events
            .partition_point(|e| e.timestamp_ms <= event.timestamp_ms);
        session.events.insert(pos, event);
        Ok(seq)
    }

    /// Close a session to further appends. Sealing twice is a no-op.
    pub fn seal(&mut self, session_id: &str) -> Result<(), StoreError> {
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))?;
        if !session.sealed {
            session.sealed = true;
            info!(session_id, events = session.events.len(), "session sealed");
        }
        Ok(())
    }

    pub fn session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Seal and hand out a copy for correlation.
    pub fn export(&mut self, session_id: &str) -> Result<Session, StoreError> {
        self.seal(session_id)?;
        self.sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))
    }

    /// Seal and export every session, in session-id order.
    pub fn export_all(&mut self) -> Vec<Session> {
        for session in self.sessions.values_mut() {
            session.sealed = true;
        }
        self.sessions.values().cloned().collect()
    }

    pub fn query(&self, session_id: &str, kind: EventKind) -> Result<Vec<&Event>, StoreError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))?;
        Ok(session.events_of(kind).collect())
    }

    pub fn clear_session(&mut self, session_id: &str) -> Result<Session, StoreError> {
        self.sessions
            .remove(session_id)
            .ok_or_else(|| StoreError::UnknownSession(session_id.to_string()))
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            sessions: self.sessions.len(),
            ..StoreStats::default()
        };
        for session in self.sessions.values() {
            if session.sealed {
                stats.sealed_sessions += 1;
            }
            stats.events += session.events.len();
            for event in &session.events {
                *stats.by_kind.entry(event.kind()).or_insert(0) += 1;
            }
        }
        stats
    }

    // ========================================================================
    // Bulk import
    // ========================================================================

    /// Import one event per line. Blank lines are ignored; malformed lines
    /// and appends to sealed sessions are skipped and counted.
    pub fn import_jsonl<R: BufRead>(&mut self, reader: R) -> Result<ImportOutcome, StoreError> {
        let mut outcome = ImportOutcome::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| StoreError::Io {
                context: format!("reading line {}", index + 1),
                source,
            })?;
            self.ingest_line(index, &line, &mut outcome);
        }
        self.log_import(&outcome);
        Ok(outcome)
    }

    /// Import a JSON export: either `{ "events": [...] }` (optionally with
    /// `device_info`) or a bare array of events.
    pub fn import_json(&mut self, content: &str) -> Result<ImportOutcome, ParseError> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|source| ParseError::Event {
                context: "export document".to_string(),
                source,
            })?;

        let (device_info, records) = match value {
            serde_json::Value::Array(items) => (None, items),
            other => {
                let doc: ExportDocument =
                    serde_json::from_value(other).map_err(|source| ParseError::Event {
                        context: "export document".to_string(),
                        source,
                    })?;
                (doc.device_info, doc.events)
            }
        };

        let mut outcome = ImportOutcome::default();
        for (index, record) in records.into_iter().enumerate() {
            let parsed =
                serde_json::from_value::<Event>(record).map_err(|source| ParseError::Event {
                    context: format!("events[{}]", index),
                    source,
                });
            self.ingest(parsed, device_info.as_ref(), &mut outcome);
        }
        self.log_import(&outcome);
        Ok(outcome)
    }

    /// Import a file by extension: `.jsonl`/`.ndjson` line by line, anything
    /// else as a JSON document.
    pub fn import_path(&mut self, path: &Path) -> Result<ImportOutcome, ParseError> {
        let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let line_oriented = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("jsonl") | Some("ndjson")
        );
        if line_oriented {
            let mut outcome = ImportOutcome::default();
            for (index, line) in content.lines().enumerate() {
                self.ingest_line(index, line, &mut outcome);
            }
            self.log_import(&outcome);
            Ok(outcome)
        } else {
            self.import_json(&content)
        }
    }

    fn ingest_line(&mut self, index: usize, line: &str, outcome: &mut ImportOutcome) {
        if line.trim().is_empty() {
            return;
        }
        let parsed = serde_json::from_str::<Event>(line).map_err(|source| ParseError::Event {
            context: format!("line {}", index + 1),
            source,
        });
        self.ingest(parsed, None, outcome);
    }

    fn ingest(
        &mut self,
        parsed: Result<Event, ParseError>,
        device_info: Option<&DeviceInfo>,
        outcome: &mut ImportOutcome,
    ) {
        let event = match parsed {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "skipping malformed event");
                outcome.skipped += 1;
                outcome.errors.push(e.to_string());
                return;
            }
        };

        let session_id = event.session_id.clone();
        if !self.sessions.contains_key(&session_id) {
            let start_time =
                DateTime::from_timestamp_millis(event.timestamp_ms as i64).unwrap_or_else(Utc::now);
            let session =
                Session::new(&session_id, start_time, device_info.cloned().unwrap_or_default());
            self.sessions.insert(session_id.clone(), session);
            outcome.sessions_created += 1;
        }

        match self.append(&session_id, event) {
            Ok(_) => outcome.imported += 1,
            Err(e) => {
                warn!(error = %e, "skipping event");
                outcome.skipped += 1;
                outcome.errors.push(e.to_string());
            }
        }
    }

    fn log_import(&self, outcome: &ImportOutcome) {
        info!(
            imported = outcome.imported,
            skipped = outcome.skipped,
            sessions_created = outcome.sessions_created,
            "event import finished"
        );
    }
}
