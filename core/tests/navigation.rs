use quire_core::{
    BranchSpec, Bus, JobError, NavigationError, Owner, Page, Participant, Progress, RuleRegistry,
    StackError, StepContext,
};
use quire_test::{GROWN_VAR, ManualRunner, Scenario, linear, var_of};
use std::sync::Arc;

struct Harness {
    part: Participant,
    rules: Arc<RuleRegistry>,
    bus: Arc<Bus>,
    runner: ManualRunner,
}

impl Harness {
    fn new(root: BranchSpec, rules: RuleRegistry) -> Self {
        let rules = Arc::new(rules);
        let bus = Arc::new(Bus::new());
        let runner = ManualRunner::new(rules.clone(), bus.clone());
        Self {
            part: Participant::new(root).unwrap(),
            rules,
            bus,
            runner,
        }
    }

    fn scenario(s: Scenario) -> Self {
        Self::new(s.root, s.rules)
    }

    async fn forward(&mut self) -> Result<Progress<()>, NavigationError> {
        let ctx = StepContext::new(&self.runner, &self.rules, &self.bus);
        self.part.navigator(ctx).forward(None).await
    }

    async fn forward_to(&mut self, target: quire_core::PageId) -> Result<Progress<()>, NavigationError> {
        let ctx = StepContext::new(&self.runner, &self.rules, &self.bus);
        self.part.navigator(ctx).forward(Some(target)).await
    }

    async fn resume(&mut self) -> Result<Progress<()>, NavigationError> {
        let ctx = StepContext::new(&self.runner, &self.rules, &self.bus);
        self.part.navigator(ctx).resume().await
    }

    fn back(&mut self) -> Result<(), NavigationError> {
        let ctx = StepContext::new(&self.runner, &self.rules, &self.bus);
        self.part.navigator(ctx).back(None)
    }

    fn current_var(&self) -> String {
        var_of(self.part.tree.current_page().unwrap().unwrap()).to_string()
    }

    fn head(&self) -> usize {
        self.part.tree.stack().head()
    }

    fn depth(&self) -> usize {
        self.part.tree.stack().len()
    }
}

#[tokio::test]
async fn test_branching_scenario_forward_and_back() {
    let s = Scenario::new();
    let (p1, p2, p3) = (s.p1, s.p2, s.p3);
    let mut h = Harness::scenario(s);

    assert_eq!(h.part.tree.current_page_id().unwrap(), Some(p1));

    assert!(!h.forward().await.unwrap().is_pending());
    assert_eq!(h.part.tree.current_page_id().unwrap(), Some(p2));

    h.forward().await.unwrap();
    assert_eq!(h.current_var(), GROWN_VAR);
    assert_eq!((h.depth(), h.head()), (2, 1));

    h.forward().await.unwrap();
    assert_eq!(h.part.tree.current_page_id().unwrap(), Some(p3));
    assert_eq!(h.head(), 0);
    assert_eq!(h.depth(), 2);

    h.back().unwrap();
    assert_eq!(h.current_var(), GROWN_VAR);
    assert_eq!(h.head(), 1);

    h.back().unwrap();
    assert_eq!(h.part.tree.current_page_id().unwrap(), Some(p2));
    assert_eq!((h.depth(), h.head()), (1, 0));

    h.back().unwrap();
    assert_eq!(h.part.tree.current_page_id().unwrap(), Some(p1));
}

#[tokio::test]
async fn test_back_undoes_forward_exactly() {
    // root: a -> [X: x1 -> [Y: y1], x2], b; root tail grows [T: t1]
    let mut rules = RuleRegistry::new();
    rules
        .grow_fn("x", |_, _| {
            Ok(Some(
                BranchSpec::new()
                    .page(Page::new().question("x1", "").grow_rule("y"))
                    .page(Page::new().question("x2", "")),
            ))
        })
        .grow_fn("y", |_, _| Ok(Some(BranchSpec::new().page(Page::new().question("y1", "")))))
        .grow_fn("tail", |_, _| Ok(Some(BranchSpec::new().page(Page::new().question("t1", "")))));
    let root = BranchSpec::new()
        .page(Page::new().question("a", "").grow_rule("x"))
        .page(Page::new().question("b", ""))
        .grow_rule("tail");
    let mut h = Harness::new(root, rules);

    let mut forward = vec![(h.current_var(), h.head())];
    for _ in 0..5 {
        h.forward().await.unwrap();
        forward.push((h.current_var(), h.head()));
    }
    let vars: Vec<_> = forward.iter().map(|(v, _)| v.as_str()).collect();
    assert_eq!(vars, ["a", "x1", "y1", "x2", "b", "t1"]);

    let mut backward = vec![(h.current_var(), h.head())];
    for _ in 0..5 {
        h.back().unwrap();
        backward.push((h.current_var(), h.head()));
    }
    backward.reverse();
    assert_eq!(backward, forward);
    assert_eq!(h.depth(), 1);
}

#[tokio::test]
async fn test_growth_is_not_repeated_while_branch_is_on_stack() {
    let s = Scenario::new();
    let p2 = s.p2;
    let mut h = Harness::scenario(s);

    h.forward().await.unwrap();
    h.forward().await.unwrap();
    h.forward().await.unwrap();

    assert!(!h.part.tree.eligible(Owner::Page(p2)).unwrap());
    let grown: Vec<_> = h
        .part
        .tree
        .stack()
        .iter()
        .filter(|b| h.part.tree.branch(*b).unwrap().origin == Some(Owner::Page(p2)))
        .collect();
    assert_eq!(grown.len(), 1);

    // going back past p2 removes B, so the next pass grows a fresh one
    h.back().unwrap();
    h.back().unwrap();
    assert!(h.part.tree.eligible(Owner::Page(p2)).unwrap());
    h.forward().await.unwrap();
    assert_eq!(h.current_var(), GROWN_VAR);
    assert_eq!(h.depth(), 2);
}

#[tokio::test]
async fn test_deferred_growth_resumes_without_duplication() {
    let s = Scenario::deferred();
    let p3 = s.p3;
    let mut h = Harness::scenario(s);

    assert!(h.forward_to(p3).await.unwrap().is_pending());
    assert_eq!(h.runner.start_count(), 1);
    assert!(h.part.router.navigator.in_progress);

    assert!(h.resume().await.unwrap().is_pending());
    assert!(h.resume().await.unwrap().is_pending());
    assert_eq!(h.runner.start_count(), 1);
    assert_eq!(h.part.jobs.len(), 1);

    assert_eq!(h.runner.complete_all().await, 1);
    assert!(!h.resume().await.unwrap().is_pending());

    assert_eq!(h.part.tree.current_page_id().unwrap(), Some(p3));
    assert!(h.part.jobs.is_empty());
    assert_eq!(h.runner.tracked(), 0);
    assert_eq!(h.runner.start_count(), 1);
    assert_eq!(h.depth(), 2);
}

#[tokio::test]
async fn test_failed_growth_surfaces_once() {
    let s = Scenario::deferred();
    let mut h = Harness::scenario(s);
    h.forward().await.unwrap();

    let Progress::Pending(ticket) = h.forward().await.unwrap() else {
        panic!("growth should be deferred");
    };
    h.runner.fail(ticket.id, "grow exploded");

    let err = h.resume().await.unwrap_err();
    assert!(matches!(
        err,
        NavigationError::Job(JobError::Failed { ref message, .. }) if message == "grow exploded"
    ));
    assert!(h.part.jobs.is_empty());
    assert_eq!(h.runner.tracked(), 0);
}

#[tokio::test]
async fn test_lost_job_is_started_again() {
    let s = Scenario::deferred();
    let mut h = Harness::scenario(s);
    h.forward().await.unwrap();

    let Progress::Pending(ticket) = h.forward().await.unwrap() else {
        panic!("growth should be deferred");
    };
    h.runner.forget(ticket.id);

    let Progress::Pending(again) = h.resume().await.unwrap() else {
        panic!("restart should be pending");
    };
    assert_ne!(again.id, ticket.id);
    assert_eq!(again.key, ticket.key);
    assert_eq!(h.runner.start_count(), 2);
}

#[tokio::test]
async fn test_grow_returning_none_continues() {
    let mut s = Scenario::new();
    s.rules.grow_fn("grow_b", |_, _| Ok(None));
    let (p2, p3) = (s.p2, s.p3);
    let mut h = Harness::scenario(s);

    h.forward().await.unwrap();
    h.forward().await.unwrap();
    assert_eq!(h.part.tree.current_page_id().unwrap(), Some(p3));
    assert_eq!(h.depth(), 1);

    h.back().unwrap();
    assert_eq!(h.part.tree.current_page_id().unwrap(), Some(p2));
}

#[tokio::test]
async fn test_grow_rule_sees_earlier_answers() {
    let mut rules = RuleRegistry::new();
    rules.grow_fn("by_age", |input, _| {
        let adult = input.answer("age").and_then(|v| v.as_u64()).is_some_and(|a| a >= 18);
        let var = if adult { "adult" } else { "minor" };
        Ok(Some(BranchSpec::new().page(Page::new().question(var, ""))))
    });
    let root = BranchSpec::new()
        .page(Page::new().question("age", "").grow_rule("by_age"))
        .page(Page::new().question("end", "").terminal());
    let mut h = Harness::new(root, rules);

    h.part.tree.current_page_mut().unwrap().unwrap().questions[0].response = Some(30.into());
    h.forward().await.unwrap();
    assert_eq!(h.current_var(), "adult");

    h.back().unwrap();
    h.part.tree.current_page_mut().unwrap().unwrap().questions[0].response = Some(12.into());
    h.forward().await.unwrap();
    assert_eq!(h.current_var(), "minor");
}

#[tokio::test]
async fn test_back_to_target_and_unreachable_target() {
    let root = linear(4);
    let first = root.pages[0].id;
    let mut h = Harness::new(root, RuleRegistry::new());
    for _ in 0..3 {
        h.forward().await.unwrap();
    }
    assert_eq!(h.current_var(), "q3");

    let ctx = StepContext::new(&h.runner, &h.rules, &h.bus);
    h.part.navigator(ctx).back(Some(first)).unwrap();
    assert_eq!(h.current_var(), "q0");

    let stray = Page::new().id;
    let ctx = StepContext::new(&h.runner, &h.rules, &h.bus);
    let err = h.part.navigator(ctx).back(Some(stray)).unwrap_err();
    assert!(matches!(err, NavigationError::Stack(StackError::TargetUnreachable(id)) if id == stray));
}

#[tokio::test]
async fn test_forward_past_the_end_is_an_error() {
    let mut h = Harness::new(linear(2), RuleRegistry::new());
    h.forward().await.unwrap();
    let err = h.forward().await.unwrap_err();
    assert!(matches!(err, NavigationError::Stack(StackError::EndOfSurvey)));
}

#[tokio::test]
async fn test_forward_target_stops_at_terminal() {
    let mut h = Harness::new(linear(3), RuleRegistry::new());
    let stray = Page::new().id;
    let err = h.forward_to(stray).await.unwrap_err();
    assert!(matches!(err, NavigationError::Stack(StackError::TargetUnreachable(_))));
    assert_eq!(h.current_var(), "q2");
}
