// Job handlers and the class -> handler lookup used by the poll loop

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Code that runs a job of one class
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn perform(&self, args: &[Value]) -> anyhow::Result<()>;
}

/// Closure form of a handler
pub type JobFn =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct FnHandler(JobFn);

#[async_trait]
impl JobHandler for FnHandler {
    async fn perform(&self, args: &[Value]) -> anyhow::Result<()> {
        (self.0)(args.to_vec()).await
    }
}

/// Handlers keyed by job class
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut classes: Vec<&String> = self.handlers.keys().collect();
        classes.sort();
        f.debug_struct("HandlerRegistry")
            .field("classes", &classes)
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `class`, replacing any previous one
    pub fn register(&mut self, class: impl Into<String>, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(class.into(), handler);
        self
    }

    /// Register an async closure for `class`
    ///
    /// ```ignore
    /// registry.register_fn("Send", |args| Box::pin(async move {
    ///     deliver(&args[0]).await
    /// }));
    /// ```
    pub fn register_fn<F>(&mut self, class: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        let job_fn: JobFn = Arc::new(f);
        self.register(class, Arc::new(FnHandler(job_fn)))
    }

    pub fn get(&self, class: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(class).cloned()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.handlers.contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
