//! Interactive "view full" actions
//!
//! Each button carries an action id and an opaque value. The registry maps the id to a
//! handler that turns the value into a [`DetailView`].

use crate::error::{AppError, AppResult};
use crate::events::{NormalizedSubject, RowEvent};
use crate::introspection::{Introspector, TableDescription};
use crate::notify::{DetailView, VIEW_ROW_ACTION, VIEW_SCHEMA_ACTION};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, value: &str) -> AppResult<DetailView>;
}

/// Live definition of a table, looked up at click time
pub struct SchemaDetailHandler {
    introspector: Arc<dyn Introspector>,
}

impl SchemaDetailHandler {
    pub fn new(introspector: Arc<dyn Introspector>) -> Self {
        Self { introspector }
    }
}

#[async_trait]
impl ActionHandler for SchemaDetailHandler {
    async fn handle(&self, value: &str) -> AppResult<DetailView> {
        let subject = NormalizedSubject::parse(value)
            .ok_or_else(|| AppError::BadRequest("Empty table reference".to_string()))?;

        let description = match self.introspector.describe(&subject).await {
            Ok(description) => description,
            Err(e) => {
                warn!("Could not describe {} for detail view: {}", subject.qualified(), e);
                TableDescription::unavailable(&subject, &e.to_string())
            }
        };

        Ok(DetailView::preformatted(
            format!("Schema: {}", subject.table),
            &description.definition,
        ))
    }
}

/// Full contents of a row carried in the button value
pub struct RowDetailHandler;

#[async_trait]
impl ActionHandler for RowDetailHandler {
    async fn handle(&self, value: &str) -> AppResult<DetailView> {
        let row: RowEvent = serde_json::from_str(value)
            .map_err(|e| AppError::BadRequest(format!("Unreadable row payload: {}", e)))?;
        Ok(DetailView::new(format!("Entry: {}", row.table), &format_row(&row)))
    }
}

/// One `*field:* value` line per column, ordered by field name
pub fn format_row(row: &RowEvent) -> String {
    if row.data.is_empty() {
        return "_No fields_".to_string();
    }
    row.data
        .iter()
        .map(|(field, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Null => "_null_".to_string(),
                other => other.to_string(),
            };
            format!("*{}:* {}", field, rendered)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Action id -> handler
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<&'static str, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with both built-in "view full" handlers
    pub fn standard(introspector: Arc<dyn Introspector>) -> Self {
        let mut registry = Self::new();
        registry.register(VIEW_SCHEMA_ACTION, Arc::new(SchemaDetailHandler::new(introspector)));
        registry.register(VIEW_ROW_ACTION, Arc::new(RowDetailHandler));
        registry
    }

    pub fn register(&mut self, action_id: &'static str, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action_id, handler);
    }

    pub async fn dispatch(&self, action_id: &str, value: &str) -> AppResult<DetailView> {
        let handler = self
            .handlers
            .get(action_id)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown action '{}'", action_id)))?;
        handler.handle(value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{MAX_TEXT_CHARS, TRUNCATION_MARKER};
    use crate::testing::{structure, FakeIntrospector};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn registry() -> (Arc<FakeIntrospector>, ActionRegistry) {
        let introspector = Arc::new(FakeIntrospector::default());
        let registry = ActionRegistry::standard(introspector.clone());
        (introspector, registry)
    }

    #[tokio::test]
    async fn test_schema_detail_shows_live_definition() {
        let (introspector, registry) = registry();
        introspector.set_table("public.Orders", structure(&[("id", "integer")]));

        let view = registry
            .dispatch(VIEW_SCHEMA_ACTION, "public.Orders")
            .await
            .unwrap();
        assert_eq!(view.title, "Schema: Orders");
        assert!(view.body.starts_with("```"));
        assert!(view.body.contains("id integer"));
    }

    #[tokio::test]
    async fn test_schema_detail_for_dropped_table() {
        let (_introspector, registry) = registry();
        let view = registry.dispatch(VIEW_SCHEMA_ACTION, "public.gone").await.unwrap();
        assert!(view.body.contains("no longer exists"));
    }

    #[tokio::test]
    async fn test_schema_detail_degrades_on_catalog_error() {
        let (introspector, registry) = registry();
        introspector.fail.store(true, Ordering::SeqCst);
        let view = registry.dispatch(VIEW_SCHEMA_ACTION, "orders").await.unwrap();
        assert!(view.body.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_row_detail_lists_fields() {
        let (_introspector, registry) = registry();
        let view = registry
            .dispatch(
                VIEW_ROW_ACTION,
                r#"{"table":"leads","data":{"id":1,"email":"x@y.z","notes":null}}"#,
            )
            .await
            .unwrap();
        assert_eq!(view.title, "Entry: leads");
        assert_eq!(view.body, "*email:* x@y.z\n*id:* 1\n*notes:* _null_");
    }

    #[tokio::test]
    async fn test_long_row_is_truncated() {
        let (_introspector, registry) = registry();
        let value = serde_json::json!({"table": "leads", "data": {"notes": "n".repeat(4000)}}).to_string();
        let view = registry.dispatch(VIEW_ROW_ACTION, &value).await.unwrap();
        assert!(view.body.ends_with(TRUNCATION_MARKER));
        assert!(view.body.chars().count() <= MAX_TEXT_CHARS + TRUNCATION_MARKER.chars().count());
    }

    #[tokio::test]
    async fn test_unknown_action_rejected() {
        let (_introspector, registry) = registry();
        assert!(matches!(
            registry.dispatch("approve_everything", "x").await,
            Err(AppError::BadRequest(_))
        ));
    }
}
