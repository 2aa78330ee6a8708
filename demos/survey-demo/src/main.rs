//! Household survey walked by a scripted participant.
//!
//! The "members" answer decides how many follow-up pages exist; they are
//! grown on a worker while the participant sees a loading page.

use anyhow::Result;
use async_trait::async_trait;
use quire::prelude::*;
use quire::runtime::init_stdout_tracing;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

// --- Shared resources ---
struct SurveyName(String);

// --- Grow rule ---
struct MemberPages {
    lookup_delay: Duration,
}

#[async_trait]
impl GrowRule for MemberPages {
    async fn grow(&self, input: &GrowInput, _bus: &Bus) -> anyhow::Result<Option<BranchSpec>> {
        // Simulate a slow roster lookup.
        tokio::time::sleep(self.lookup_delay).await;

        let count = input.answer("members").and_then(Value::as_u64).unwrap_or(0);
        if count == 0 {
            return Ok(None);
        }
        let branch = (1..=count)
            .map(|i| {
                Page::new()
                    .question(format!("member_{i}_age"), format!("Age of person {i}?"))
                    .with_back()
            })
            .collect();
        Ok(Some(branch))
    }
}

fn rules() -> RuleRegistry {
    let mut rules = RuleRegistry::new();
    rules
        .compile_fn("greeting", |page, bus| {
            let name = bus
                .get::<SurveyName>()
                .map(|n| n.0.as_str())
                .unwrap_or("our survey");
            if let Some(q) = page.question_mut("consent") {
                q.label = format!("Welcome to {name}. Do you agree to take part?");
            }
            Ok(())
        })
        .validate_fn("household_size", |page, _| {
            let valid = page
                .response("members")
                .and_then(Value::as_u64)
                .is_some_and(|n| (1..=6).contains(&n));
            Ok((!valid).then(|| "Please enter a number from 1 to 6".to_string()))
        })
        .register_grow(
            "member_pages",
            MemberPages {
                lookup_delay: Duration::from_millis(50),
            },
        );
    rules
}

fn survey() -> BranchSpec {
    BranchSpec::new()
        .page(
            Page::new()
                .question("consent", "")
                .compile_rule("greeting")
                .cached_compile(),
        )
        .page(
            Page::new()
                .question("members", "How many people live with you?")
                .with_back()
                .validate_rule("household_size")
                .grow_rule("member_pages")
                .defer(Method::Grow),
        )
        .page(
            Page::new()
                .question("comments", "Anything else?")
                .with_back()
                .terminal(),
        )
}

/// Send a request and keep polling while the router reports a loading page.
async fn send(router: &Router, part: &mut Participant, request: Request) -> Result<Artifact> {
    let mut artifact = router.handle_request(part, request).await?;
    while let Artifact::Loading { body, .. } = &artifact {
        println!("  ... {body}");
        tokio::time::sleep(Duration::from_millis(20)).await;
        artifact = router.handle_request(part, Request::Get).await?;
    }
    Ok(artifact)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_stdout_tracing();

    let settings = Settings::load("quire.toml")?.with_env()?;
    let rules = Arc::new(rules());
    let bus = Arc::new(Bus::new().with(SurveyName("the household study".into())));
    let pool = WorkerPool::new(settings.workers.clone(), rules.clone(), bus.clone())?;
    let router = Router::new(settings, rules, bus, Arc::new(pool.clone()));

    let mut part = router.enroll(survey()).await?;
    tracing::info!(participant = %part.id, "starting scripted run");

    let script = [
        Submission::forward().answer("consent", "yes"),
        Submission::forward().answer("members", 0),
        Submission::forward().answer("members", 2),
        Submission::forward().answer("member_1_age", 41),
        Submission::back(),
        Submission::forward().answer("members", 2),
        Submission::forward().answer("member_1_age", 42),
        Submission::forward().answer("member_2_age", 9),
        Submission::forward().answer("comments", "none"),
    ];

    for submission in script {
        let page = send(&router, &mut part, Request::Get).await?;
        println!("\n{}", page.body().unwrap_or_default());
        println!("> {:?} {:?}", submission.direction, submission.responses);
        send(&router, &mut part, Request::Post(submission)).await?;
    }

    let last = send(&router, &mut part, Request::Get).await?;
    println!("\n{}", last.body().unwrap_or_default());
    println!("completed: {}", part.completed);
    println!("answers: {}", serde_json::to_string_pretty(&part.tree.answers())?);
    println!("\n{}", part.tree.outline());

    pool.shutdown().await;
    Ok(())
}
