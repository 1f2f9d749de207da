//! Scriptable integration adapter.
//!
//! Each call to `sync` consumes the next scripted step; once the script is
//! exhausted the fallback step repeats.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use serde_json::Value;
use staffsync_core::EntityAction;
use staffsync_delivery::{AdapterHealth, DeliveryError, IntegrationAdapter, Result, SyncOutcome};

/// Behaviour of one scripted sync call or health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Report success.
    Succeed,
    /// Report a failed outcome with this message.
    Fail(String),
    /// Return an adapter error with this message.
    Error(String),
    /// Panic inside the adapter.
    Panic,
    /// Wait this long, then succeed.
    Delay(Duration),
}

/// Adapter whose behaviour is scripted per call.
#[derive(Debug)]
pub struct ScriptedAdapter {
    name: String,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    health: Step,
    calls: AtomicUsize,
}

impl ScriptedAdapter {
    /// Creates an adapter that runs `script`, then repeats `fallback`.
    pub fn new(name: impl Into<String>, script: Vec<Step>, fallback: Step) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into()),
            fallback,
            health: Step::Succeed,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always succeeds.
    pub fn always_succeeds(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), Step::Succeed)
    }

    /// Always reports failure with `message`.
    pub fn always_fails(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), Step::Fail(message.into()))
    }

    /// Fails `times` times with `message`, then succeeds.
    pub fn fails_then_succeeds(
        name: impl Into<String>,
        times: usize,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self::new(name, vec![Step::Fail(message); times], Step::Succeed)
    }

    /// Reports itself unhealthy.
    #[must_use]
    pub fn unhealthy(self) -> Self {
        self.with_health(Step::Error("health check failed".to_string()))
    }

    /// Answers health checks according to `step`.
    #[must_use]
    pub fn with_health(mut self, step: Step) -> Self {
        self.health = step;
        self
    }

    /// Number of `sync` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut script = self.script.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait::async_trait]
impl IntegrationAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sync(
        &self,
        entity_id: &str,
        _payload: &Value,
        _action: EntityAction,
    ) -> Result<SyncOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match self.next_step() {
            Step::Succeed => Ok(SyncOutcome::ok(format!("{} synced {entity_id}", self.name))),
            Step::Fail(message) => Ok(SyncOutcome::failed(message)),
            Step::Error(message) => Err(DeliveryError::adapter(&self.name, message)),
            Step::Panic => panic!("{} adapter panicked", self.name),
            Step::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(SyncOutcome::ok(format!("{} synced {entity_id} slowly", self.name)))
            },
        }
    }

    async fn health_check(&self) -> Result<AdapterHealth> {
        match self.health.clone() {
            Step::Succeed => Ok(AdapterHealth::healthy(format!("{} ok", self.name))),
            Step::Fail(message) => Ok(AdapterHealth::unhealthy(message)),
            Step::Error(message) => Err(DeliveryError::adapter(&self.name, message)),
            Step::Panic => panic!("{} health check panicked", self.name),
            Step::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(AdapterHealth::healthy(format!("{} ok after {delay:?}", self.name)))
            },
        }
    }
}
