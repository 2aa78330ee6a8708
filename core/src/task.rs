//! The four kinds of step work, as data.
//!
//! A [`Task`] carries a detached snapshot of everything its rules need, so it
//! can run inline on the request path or be shipped to a worker and executed
//! there. [`JobOutput`] carries the result back.

use crate::branch::BranchSpec;
use crate::bus::Bus;
use crate::job::{JobKey, Method, Owner};
use crate::page::Page;
use crate::rules::{RuleError, RuleRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// What a grow rule gets to look at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowInput {
    pub origin: Owner,
    /// The origin page, or the pages of the origin branch.
    pub pages: Vec<Page>,
    /// Every recorded response on the active stack, keyed by question var.
    pub answers: BTreeMap<String, Value>,
}

impl GrowInput {
    pub fn answer(&self, var: &str) -> Option<&Value> {
        self.answers.get(var)
    }

    /// The origin page when the origin is a page.
    pub fn origin_page(&self) -> Option<&Page> {
        match self.origin {
            Owner::Page(id) => self.pages.iter().find(|p| p.id == id),
            Owner::Branch(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Task {
    Compile { page: Page },
    Validate { page: Page },
    Submit { page: Page },
    Grow { input: GrowInput, rule: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobOutput {
    Compiled(Page),
    Validated(Page),
    Submitted(Page),
    Grown(Option<BranchSpec>),
}

impl JobOutput {
    pub fn method(&self) -> Method {
        match self {
            JobOutput::Compiled(_) => Method::Compile,
            JobOutput::Validated(_) => Method::Validate,
            JobOutput::Submitted(_) => Method::Submit,
            JobOutput::Grown(_) => Method::Grow,
        }
    }
}

impl Task {
    pub fn method(&self) -> Method {
        match self {
            Task::Compile { .. } => Method::Compile,
            Task::Validate { .. } => Method::Validate,
            Task::Submit { .. } => Method::Submit,
            Task::Grow { .. } => Method::Grow,
        }
    }

    pub fn owner(&self) -> Owner {
        match self {
            Task::Compile { page } | Task::Validate { page } | Task::Submit { page } => {
                Owner::Page(page.id)
            }
            Task::Grow { input, .. } => input.origin,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.owner(), self.method())
    }

    /// Run the task's rules in order against its snapshot.
    pub async fn execute(self, rules: &RuleRegistry, bus: &Bus) -> Result<JobOutput, RuleError> {
        match self {
            Task::Compile { mut page } => {
                for name in page.compile.rules.clone() {
                    rules
                        .compile(&name)?
                        .compile(&mut page, bus)
                        .await
                        .map_err(|e| RuleError::failed(Method::Compile, &name, e))?;
                }
                if page.cache_compile {
                    page.compile.rules.clear();
                    page.compile.deferred = false;
                }
                Ok(JobOutput::Compiled(page))
            }
            Task::Validate { mut page } => {
                page.error = None;
                for name in page.validate.rules.clone() {
                    let message = rules
                        .validate(&name)?
                        .validate(&page, bus)
                        .await
                        .map_err(|e| RuleError::failed(Method::Validate, &name, e))?;
                    if message.is_some() {
                        page.error = message;
                        break;
                    }
                }
                Ok(JobOutput::Validated(page))
            }
            Task::Submit { mut page } => {
                for name in page.submit.rules.clone() {
                    rules
                        .submit(&name)?
                        .submit(&mut page, bus)
                        .await
                        .map_err(|e| RuleError::failed(Method::Submit, &name, e))?;
                }
                Ok(JobOutput::Submitted(page))
            }
            Task::Grow { input, rule } => {
                let grown = rules
                    .grow(&rule)?
                    .grow(&input, bus)
                    .await
                    .map_err(|e| RuleError::failed(Method::Grow, &rule, e))?;
                Ok(JobOutput::Grown(grown))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn registry() -> RuleRegistry {
        let mut r = RuleRegistry::new();
        r.compile_fn("label", |page, _| {
            page.questions[0].label = "compiled".into();
            Ok(())
        })
        .validate_fn("first", |page, _| {
            Ok(page.response("q").is_none().then(|| "answer required".to_string()))
        })
        .validate_fn("second", |_, _| Ok(Some("unreachable".into())))
        .submit_fn("boom", |_, _| anyhow::bail!("store offline"))
        .grow_fn("echo", |input, _| {
            Ok(input
                .answer("q")
                .map(|_| BranchSpec::new().page(Page::new())))
        });
        r
    }

    #[test]
    fn test_compile_runs_rules_and_caches() {
        let page = Page::new().question("q", "raw").compile_rule("label").cached_compile();
        let out = block_on(Task::Compile { page }.execute(&registry(), &Bus::new())).unwrap();
        let JobOutput::Compiled(page) = out else {
            panic!("expected compiled output");
        };
        assert_eq!(page.questions[0].label, "compiled");
        assert!(page.compile.is_empty());
    }

    #[test]
    fn test_validate_stops_at_first_message() {
        let mut page = Page::new()
            .question("q", "?")
            .validate_rule("first")
            .validate_rule("second");
        page.error = Some("stale".into());

        let out = block_on(Task::Validate { page: page.clone() }.execute(&registry(), &Bus::new()));
        let Ok(JobOutput::Validated(checked)) = out else {
            panic!("expected validated output");
        };
        assert_eq!(checked.error.as_deref(), Some("answer required"));

        page.questions[0].response = Some(json!(1));
        let out = block_on(Task::Validate { page }.execute(&registry(), &Bus::new()));
        let Ok(JobOutput::Validated(checked)) = out else {
            panic!("expected validated output");
        };
        assert_eq!(checked.error.as_deref(), Some("unreachable"));
    }

    #[test]
    fn test_submit_failure_is_a_rule_error() {
        let page = Page::new().submit_rule("boom");
        let err = block_on(Task::Submit { page }.execute(&registry(), &Bus::new())).unwrap_err();
        assert!(matches!(err, RuleError::Failed { kind: Method::Submit, .. }));
    }

    #[test]
    fn test_grow_may_return_nothing() {
        let origin = Owner::Page(crate::page::PageId::new());
        let input = GrowInput {
            origin,
            pages: Vec::new(),
            answers: BTreeMap::new(),
        };
        let task = Task::Grow {
            input,
            rule: "echo".into(),
        };
        assert_eq!(task.key(), JobKey::new(origin, Method::Grow));
        let out = block_on(task.execute(&registry(), &Bus::new())).unwrap();
        assert_eq!(out, JobOutput::Grown(None));
    }
}
