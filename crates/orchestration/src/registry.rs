//! Name-to-implementation registries for orchestrations and activities.
//!
//! Both registries are built once at startup and shared read-only.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::context::WorkflowContext;
use crate::error::{ActivityError, WorkflowResult};

/// A workflow program.
///
/// `run` is re-executed from the top on every pass, so it must be
/// deterministic: its sequence of activity calls may depend only on the input
/// and on earlier activity outcomes. No clocks, randomness or I/O.
pub trait Orchestration: Send + Sync {
    fn run(&self, ctx: &mut WorkflowContext<'_>) -> WorkflowResult<Value>;
}

/// Adapts a plain function into an [`Orchestration`].
pub struct FnOrchestration<F>(pub F);

impl<F> Orchestration for FnOrchestration<F>
where
    F: Fn(&mut WorkflowContext<'_>) -> WorkflowResult<Value> + Send + Sync,
{
    fn run(&self, ctx: &mut WorkflowContext<'_>) -> WorkflowResult<Value> {
        (self.0)(ctx)
    }
}

/// Registered orchestrations by name.
#[derive(Clone, Default)]
pub struct OrchestrationRegistry {
    orchestrations: HashMap<String, Arc<dyn Orchestration>>,
}

impl OrchestrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an orchestration, replacing any previous one with that name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        orchestration: impl Orchestration + 'static,
    ) -> &mut Self {
        self.orchestrations
            .insert(name.into(), Arc::new(orchestration));
        self
    }

    /// Registers a plain function as an orchestration.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut WorkflowContext<'_>) -> WorkflowResult<Value> + Send + Sync + 'static,
    {
        self.register(name, FnOrchestration(f))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Orchestration>> {
        self.orchestrations.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.orchestrations.contains_key(name)
    }
}

/// An activity implementation working on JSON values.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    async fn invoke(&self, input: Value) -> Result<Value, ActivityError>;
}

struct FnActivity<F, I, O> {
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<F, Fut, I, O> ActivityHandler for FnActivity<F, I, O>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ActivityError>> + Send + 'static,
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    async fn invoke(&self, input: Value) -> Result<Value, ActivityError> {
        let input: I = serde_json::from_value(input)
            .map_err(|e| ActivityError::failed(format!("invalid activity input: {e}")))?;
        let output = (self.f)(input).await?;
        serde_json::to_value(output)
            .map_err(|e| ActivityError::failed(format!("invalid activity output: {e}")))
    }
}

/// Registered activities by name.
#[derive(Clone, Default)]
pub struct ActivityRegistry {
    handlers: HashMap<String, Arc<dyn ActivityHandler>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a typed async function. Input and output are converted
    /// from and to JSON; conversion errors fail the activity.
    pub fn register<F, Fut, I, O>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ActivityError>> + Send + 'static,
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
    {
        self.register_handler(
            name,
            Arc::new(FnActivity {
                f,
                _types: PhantomData,
            }),
        )
    }

    pub fn register_handler(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ActivityHandler>,
    ) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActivityHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
