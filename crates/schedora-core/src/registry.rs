//! C7: the handler registry — a `job_type` string -> executable handler
//! table.
//!
//! Grounded on the teacher's "one capability, pick any concrete
//! abstraction that satisfies it" design note: `Handler` is a one-method
//! async trait object, the same shape as the teacher's `Effect` trait,
//! generalised from "command in, event out" to "payload in, result or
//! error out".

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{Result, SchedoraError};

/// A job handler. Implementations may be blocking or cooperative — the
/// executor normalises by running handlers inside a timeout future; a
/// handler that needs to block the executor thread should offload to
/// `tokio::task::spawn_blocking` itself.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(&self, payload: Value) -> anyhow::Result<Value>;
}

/// Adapts a plain async closure to `Handler`, for handlers that don't need
/// their own type (the teacher's `ai-summarizer`/`http-fetcher` examples
/// define dedicated effect structs; most job handlers don't need that
/// much ceremony).
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<Value>> + Send,
{
    async fn invoke(&self, payload: Value) -> anyhow::Result<Value> {
        (self.0)(payload).await
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors if `job_type` is already registered — handler wiring is
    /// expected to happen once, at startup, and a silent overwrite would
    /// hide a configuration mistake.
    pub fn register(&self, job_type: impl Into<String>, handler: Arc<dyn Handler>) -> Result<()> {
        let job_type = job_type.into();
        match self.handlers.entry(job_type.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(SchedoraError::Storage(anyhow::anyhow!(
                    "handler for job type {job_type:?} already registered"
                )))
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(handler);
                Ok(())
            }
        }
    }

    pub fn get(&self, job_type: &str) -> Result<Arc<dyn Handler>> {
        self.handlers
            .get(job_type)
            .map(|h| h.clone())
            .ok_or_else(|| SchedoraError::HandlerMissing(job_type.to_string()))
    }

    pub fn has(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn list(&self) -> Vec<String> {
        self.handlers.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let registry = HandlerRegistry::new();
        registry
            .register("echo", Arc::new(FnHandler(|payload: Value| async move { Ok(payload) })))
            .unwrap();

        assert!(registry.has("echo"));
        assert_eq!(registry.list(), vec!["echo".to_string()]);

        let handler = registry.get("echo").unwrap();
        let result = handler.invoke(json!({"x": 1})).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[test]
    fn registering_the_same_type_twice_is_an_error() {
        let registry = HandlerRegistry::new();
        registry
            .register("echo", Arc::new(FnHandler(|p: Value| async move { Ok(p) })))
            .unwrap();
        let err = registry
            .register("echo", Arc::new(FnHandler(|p: Value| async move { Ok(p) })))
            .unwrap_err();
        assert!(matches!(err, SchedoraError::Storage(_)));
    }

    #[test]
    fn missing_handler_is_handler_missing() {
        let registry = HandlerRegistry::new();
        let err = registry.get("nope").unwrap_err();
        assert!(matches!(err, SchedoraError::HandlerMissing(ref t) if t == "nope"));
    }
}
