use quire_core::{
    Bus, JobBook, JobError, Method, NavigationError, Page, Participant, Progress, RuleRegistry,
    StepContext, Submission,
};
use quire_test::ManualRunner;
use serde_json::json;
use std::sync::Arc;

fn rules() -> RuleRegistry {
    let mut rules = RuleRegistry::new();
    rules
        .compile_fn("greet", |page, bus| {
            let name = bus.get::<String>().cloned().unwrap_or_default();
            page.questions[0].label = format!("Hello {name}");
            Ok(())
        })
        .validate_fn("required", |page, _| {
            Ok(page
                .response("q")
                .is_none()
                .then(|| "Please answer".to_string()))
        })
        .submit_fn("skip_back", |page, _| {
            if page.response("q") == Some(&json!("undo")) {
                page.direction_from = quire_core::Direction::Back;
            }
            Ok(())
        });
    rules
}

fn page() -> Page {
    Page::new()
        .question("q", "")
        .compile_rule("greet")
        .validate_rule("required")
        .submit_rule("skip_back")
}

#[tokio::test]
async fn test_inline_steps_write_back_into_tree() {
    let rules = Arc::new(rules());
    let bus = Arc::new(Bus::new().with("Ada".to_string()));
    let runner = ManualRunner::new(rules.clone(), bus.clone());
    let ctx = StepContext::new(&runner, &rules, &bus);

    let page = page();
    let id = page.id;
    let mut part = Participant::new([page].into_iter().collect()).unwrap();

    let done = ctx
        .run_page_step(&mut part.tree, &mut part.jobs, id, Method::Compile)
        .await
        .unwrap();
    assert_eq!(done, Progress::Ready(()));
    assert_eq!(part.tree.page(id).unwrap().questions[0].label, "Hello Ada");

    ctx.run_page_step(&mut part.tree, &mut part.jobs, id, Method::Validate)
        .await
        .unwrap();
    assert!(!part.tree.page(id).unwrap().is_valid());

    part.tree
        .page_mut(id)
        .unwrap()
        .record_response(&Submission::forward().answer("q", "undo"));
    ctx.run_page_step(&mut part.tree, &mut part.jobs, id, Method::Validate)
        .await
        .unwrap();
    ctx.run_page_step(&mut part.tree, &mut part.jobs, id, Method::Submit)
        .await
        .unwrap();
    let page = part.tree.page(id).unwrap();
    assert!(page.is_valid());
    assert_eq!(page.direction_from, quire_core::Direction::Back);
    assert_eq!(runner.start_count(), 0);
}

#[tokio::test]
async fn test_deferred_step_goes_through_runner() {
    let rules = Arc::new(rules());
    let bus = Arc::new(Bus::new().with("Lin".to_string()));
    let runner = ManualRunner::new(rules.clone(), bus.clone());
    let ctx = StepContext::new(&runner, &rules, &bus);

    let page = page().defer(Method::Compile);
    let id = page.id;
    let mut part = Participant::new([page].into_iter().collect()).unwrap();

    let first = ctx
        .run_page_step(&mut part.tree, &mut part.jobs, id, Method::Compile)
        .await
        .unwrap();
    assert!(first.is_pending());
    assert_eq!(part.tree.page(id).unwrap().questions[0].label, "");

    runner.complete_all().await;
    let second = ctx
        .run_page_step(&mut part.tree, &mut part.jobs, id, Method::Compile)
        .await
        .unwrap();
    assert_eq!(second, Progress::Ready(()));
    assert_eq!(part.tree.page(id).unwrap().questions[0].label, "Hello Lin");
    assert!(part.jobs.is_empty());
}

#[tokio::test]
async fn test_step_without_rules_never_starts_a_job() {
    let rules = Arc::new(RuleRegistry::new());
    let bus = Arc::new(Bus::new());
    let runner = ManualRunner::new(rules.clone(), bus.clone());
    let ctx = StepContext::new(&runner, &rules, &bus);

    let page = Page::new().defer(Method::Submit);
    let id = page.id;
    let mut part = Participant::new([page].into_iter().collect()).unwrap();

    let out = ctx
        .run_page_step(&mut part.tree, &mut part.jobs, id, Method::Submit)
        .await
        .unwrap();
    assert_eq!(out, Progress::Ready(()));
    assert_eq!(runner.start_count(), 0);
}

#[tokio::test]
async fn test_rejected_start_is_an_error() {
    let rules = Arc::new(rules());
    let bus = Arc::new(Bus::new());
    let runner = ManualRunner::new(rules.clone(), bus.clone());
    runner.refuse(Some("queue full".into()));
    let ctx = StepContext::new(&runner, &rules, &bus);

    let page = page().defer(Method::Validate);
    let id = page.id;
    let mut part = Participant::new([page].into_iter().collect()).unwrap();

    let err = ctx
        .run_page_step(&mut part.tree, &mut part.jobs, id, Method::Validate)
        .await
        .unwrap_err();
    assert!(matches!(err, NavigationError::Job(JobError::Rejected { .. })));
    assert!(part.jobs.is_empty());
}

#[tokio::test]
async fn test_unknown_rule_fails_inline() {
    let rules = Arc::new(RuleRegistry::new());
    let bus = Arc::new(Bus::new());
    let runner = ManualRunner::new(rules.clone(), bus.clone());
    let ctx = StepContext::new(&runner, &rules, &bus);

    let mut jobs = JobBook::new();
    let page = Page::new().compile_rule("missing");
    let id = page.id;
    let mut part = Participant::new([page].into_iter().collect()).unwrap();

    let err = ctx
        .run_page_step(&mut part.tree, &mut jobs, id, Method::Compile)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no compile rule named `missing`"));
}
