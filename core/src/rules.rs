//! Rule contracts and the name-keyed registry that resolves them.
//!
//! Pages and branches only carry rule *names*; the host registers the
//! implementations once at start-up and shares the registry with the router
//! and with the worker pool.

use crate::branch::BranchSpec;
use crate::bus::Bus;
use crate::job::Method;
use crate::page::Page;
use crate::task::GrowInput;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Runs before a page is rendered. May rewrite questions or labels.
#[async_trait]
pub trait CompileRule: Send + Sync + 'static {
    async fn compile(&self, page: &mut Page, bus: &Bus) -> anyhow::Result<()>;
}

/// Checks a submitted page. `Some(message)` marks the page invalid.
#[async_trait]
pub trait ValidateRule: Send + Sync + 'static {
    async fn validate(&self, page: &Page, bus: &Bus) -> anyhow::Result<Option<String>>;
}

/// Runs after a valid submission. May change `direction_from`, `forward_to`
/// or `back_to` to redirect the participant.
#[async_trait]
pub trait SubmitRule: Send + Sync + 'static {
    async fn submit(&self, page: &mut Page, bus: &Bus) -> anyhow::Result<()>;
}

/// Produces the next branch from a page or branch. `None` grows nothing.
#[async_trait]
pub trait GrowRule: Send + Sync + 'static {
    async fn grow(&self, input: &GrowInput, bus: &Bus) -> anyhow::Result<Option<BranchSpec>>;
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("no {kind} rule named `{name}`")]
    Unknown { kind: Method, name: String },

    #[error("{kind} rule `{name}` failed: {source}")]
    Failed {
        kind: Method,
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RuleError {
    pub(crate) fn failed(kind: Method, name: &str, err: anyhow::Error) -> Self {
        RuleError::Failed {
            kind,
            name: name.to_string(),
            source: err.into(),
        }
    }
}

/// Adapter that lets a plain closure act as a rule.
pub struct FnRule<F>(pub F);

#[async_trait]
impl<F> CompileRule for FnRule<F>
where
    F: Fn(&mut Page, &Bus) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn compile(&self, page: &mut Page, bus: &Bus) -> anyhow::Result<()> {
        (self.0)(page, bus)
    }
}

#[async_trait]
impl<F> ValidateRule for FnRule<F>
where
    F: Fn(&Page, &Bus) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
{
    async fn validate(&self, page: &Page, bus: &Bus) -> anyhow::Result<Option<String>> {
        (self.0)(page, bus)
    }
}

#[async_trait]
impl<F> SubmitRule for FnRule<F>
where
    F: Fn(&mut Page, &Bus) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn submit(&self, page: &mut Page, bus: &Bus) -> anyhow::Result<()> {
        (self.0)(page, bus)
    }
}

#[async_trait]
impl<F> GrowRule for FnRule<F>
where
    F: Fn(&GrowInput, &Bus) -> anyhow::Result<Option<BranchSpec>> + Send + Sync + 'static,
{
    async fn grow(&self, input: &GrowInput, bus: &Bus) -> anyhow::Result<Option<BranchSpec>> {
        (self.0)(input, bus)
    }
}

#[derive(Clone, Default)]
pub struct RuleRegistry {
    compile: HashMap<String, Arc<dyn CompileRule>>,
    validate: HashMap<String, Arc<dyn ValidateRule>>,
    submit: HashMap<String, Arc<dyn SubmitRule>>,
    grow: HashMap<String, Arc<dyn GrowRule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_compile(&mut self, name: impl Into<String>, rule: impl CompileRule) -> &mut Self {
        self.compile.insert(name.into(), Arc::new(rule));
        self
    }

    pub fn register_validate(&mut self, name: impl Into<String>, rule: impl ValidateRule) -> &mut Self {
        self.validate.insert(name.into(), Arc::new(rule));
        self
    }

    pub fn register_submit(&mut self, name: impl Into<String>, rule: impl SubmitRule) -> &mut Self {
        self.submit.insert(name.into(), Arc::new(rule));
        self
    }

    pub fn register_grow(&mut self, name: impl Into<String>, rule: impl GrowRule) -> &mut Self {
        self.grow.insert(name.into(), Arc::new(rule));
        self
    }

    pub fn compile_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut Page, &Bus) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.compile.insert(name.into(), Arc::new(FnRule(f)));
        self
    }

    pub fn validate_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Page, &Bus) -> anyhow::Result<Option<String>> + Send + Sync + 'static,
    {
        self.validate.insert(name.into(), Arc::new(FnRule(f)));
        self
    }

    pub fn submit_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut Page, &Bus) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.submit.insert(name.into(), Arc::new(FnRule(f)));
        self
    }

    pub fn grow_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&GrowInput, &Bus) -> anyhow::Result<Option<BranchSpec>> + Send + Sync + 'static,
    {
        self.grow.insert(name.into(), Arc::new(FnRule(f)));
        self
    }

    fn lookup<T: ?Sized>(
        map: &HashMap<String, Arc<T>>,
        kind: Method,
        name: &str,
    ) -> Result<Arc<T>, RuleError> {
        map.get(name).cloned().ok_or_else(|| RuleError::Unknown {
            kind,
            name: name.to_string(),
        })
    }

    pub fn compile(&self, name: &str) -> Result<Arc<dyn CompileRule>, RuleError> {
        Self::lookup(&self.compile, Method::Compile, name)
    }

    pub fn validate(&self, name: &str) -> Result<Arc<dyn ValidateRule>, RuleError> {
        Self::lookup(&self.validate, Method::Validate, name)
    }

    pub fn submit(&self, name: &str) -> Result<Arc<dyn SubmitRule>, RuleError> {
        Self::lookup(&self.submit, Method::Submit, name)
    }

    pub fn grow(&self, name: &str) -> Result<Arc<dyn GrowRule>, RuleError> {
        Self::lookup(&self.grow, Method::Grow, name)
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("compile", &self.compile.len())
            .field("validate", &self.validate.len())
            .field("submit", &self.submit.len())
            .field("grow", &self.grow.len())
            .finish()
    }
}
