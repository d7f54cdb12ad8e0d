//! Event classifier
//!
//! Decides whether a schema notification is actionable. The checks run in a fixed order
//! (command, subject, noise, object type, cooldown) so that only events that would otherwise
//! be processed ever touch the dedup cache.

use super::dedup::DedupCache;
use super::event::{NormalizedSubject, Operation, SchemaEvent};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Name fragments produced by PostgreSQL for implicit constraints, indexes and sequences
const NOISE_MARKERS: &[&str] = &["_pkey", "_fkey", "_idx", "_seq", "_check", "_excl", "pg_toast"];

/// Why an event was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UntrackedCommand,
    EmptySubject,
    Noise,
    NotATable,
    Duplicate,
}

/// Classification result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Ignore(IgnoreReason),
    Process {
        subject: NormalizedSubject,
        operation: Operation,
    },
}

impl Action {
    pub fn is_process(&self) -> bool {
        matches!(self, Action::Process { .. })
    }
}

/// Case-insensitive match against [`NOISE_MARKERS`]
pub fn is_noise(name: &str) -> bool {
    let lowered = name.to_lowercase();
    NOISE_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Stateless apart from the shared cooldown cache
#[derive(Clone)]
pub struct Classifier {
    dedup: Arc<DedupCache>,
}

impl Classifier {
    pub fn new(dedup: Arc<DedupCache>) -> Self {
        Self { dedup }
    }

    pub fn classify(&self, event: &SchemaEvent) -> Action {
        self.classify_at(event, Instant::now())
    }

    /// Classify as if the event arrived at `now`
    pub fn classify_at(&self, event: &SchemaEvent, now: Instant) -> Action {
        let Some(operation) = Operation::from_command_tag(&event.command_tag) else {
            return Action::Ignore(IgnoreReason::UntrackedCommand);
        };

        let Some(subject) = event.subject_identifier().and_then(NormalizedSubject::parse) else {
            return Action::Ignore(IgnoreReason::EmptySubject);
        };

        if is_noise(&subject.table) {
            debug!("Ignoring generated object {} ({})", subject, operation);
            return Action::Ignore(IgnoreReason::Noise);
        }

        if let Some(object_type) = event.object_type.as_deref() {
            if !object_type.trim().eq_ignore_ascii_case("table") {
                debug!("Ignoring {} of {} {}", operation, object_type, subject);
                return Action::Ignore(IgnoreReason::NotATable);
            }
        }

        if !self.dedup.check_and_record(&subject, now) {
            debug!("Duplicate {} for {} suppressed", operation, subject);
            return Action::Ignore(IgnoreReason::Duplicate);
        }

        Action::Process { subject, operation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn classifier() -> Classifier {
        Classifier::new(Arc::new(DedupCache::new(Duration::from_secs(5))))
    }

    fn event(tag: &str, name: &str) -> SchemaEvent {
        SchemaEvent {
            command_tag: tag.to_string(),
            object_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_is_processed_with_normalized_subject() {
        let action = classifier().classify(&event("CREATE TABLE", "public.\"Orders\"[]"));
        assert_eq!(
            action,
            Action::Process {
                subject: NormalizedSubject::new("public", "Orders"),
                operation: Operation::Create,
            }
        );
    }

    #[test]
    fn test_untracked_command_is_ignored() {
        let action = classifier().classify(&event("CREATE INDEX", "public.orders"));
        assert_eq!(action, Action::Ignore(IgnoreReason::UntrackedCommand));
    }

    #[test]
    fn test_empty_subject_is_ignored() {
        let action = classifier().classify(&SchemaEvent {
            command_tag: "ALTER TABLE".to_string(),
            ..Default::default()
        });
        assert_eq!(action, Action::Ignore(IgnoreReason::EmptySubject));
    }

    #[test]
    fn test_noise_is_ignored_for_every_operation() {
        let classifier = classifier();
        for tag in ["CREATE TABLE", "ALTER TABLE", "DROP TABLE"] {
            assert_eq!(
                classifier.classify(&event(tag, "public.orders_pkey")),
                Action::Ignore(IgnoreReason::Noise)
            );
            assert_eq!(
                classifier.classify(&event(tag, "ORDERS_ID_SEQ")),
                Action::Ignore(IgnoreReason::Noise)
            );
        }
        assert!(classifier.dedup.is_empty());
    }

    #[test]
    fn test_non_table_object_type_is_ignored() {
        let mut alter = event("ALTER TABLE", "public.orders");
        alter.object_type = Some("table column".to_string());
        assert_eq!(classifier().classify(&alter), Action::Ignore(IgnoreReason::NotATable));

        alter.object_type = Some("TABLE".to_string());
        assert!(classifier().classify(&alter).is_process());
    }

    #[test]
    fn test_duplicates_inside_cooldown_are_suppressed() {
        let classifier = classifier();
        let t0 = Instant::now();
        let create = event("CREATE TABLE", "public.Orders");

        assert!(classifier.classify_at(&create, t0).is_process());
        assert_eq!(
            classifier.classify_at(&create, t0 + Duration::from_secs(3)),
            Action::Ignore(IgnoreReason::Duplicate)
        );
        assert!(classifier
            .classify_at(&create, t0 + Duration::from_secs(6))
            .is_process());
    }

    #[test]
    fn test_dedup_key_ignores_spelling_and_operation() {
        let classifier = classifier();
        let t0 = Instant::now();
        assert!(classifier
            .classify_at(&event("CREATE TABLE", "\"Orders\""), t0)
            .is_process());
        assert_eq!(
            classifier.classify_at(&event("ALTER TABLE", "public.Orders"), t0 + Duration::from_secs(1)),
            Action::Ignore(IgnoreReason::Duplicate)
        );
    }
}
