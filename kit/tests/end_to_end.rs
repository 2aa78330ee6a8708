#![cfg(feature = "workers")]

use quire::prelude::*;
use quire_test::{answer, var_of, Scenario, GROWN_VAR};
use std::sync::Arc;
use std::time::Duration;

/// Re-issue a request until the router stops answering with a loading page.
async fn settle(router: &Router, part: &mut Participant, request: Request) -> Artifact {
    let mut artifact = router.handle_request(part, request).await.unwrap();
    for _ in 0..500 {
        if !artifact.is_loading() {
            return artifact;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
        artifact = router.handle_request(part, Request::Get).await.unwrap();
    }
    panic!("request never settled");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deferred_growth_through_worker_pool() {
    let scenario = Scenario::deferred();
    let rules = Arc::new(scenario.rules);
    let bus = Arc::new(Bus::new());
    let settings = Settings::default();
    let pool = WorkerPool::new(settings.workers.clone(), rules.clone(), bus.clone()).unwrap();
    let router = Router::new(settings, rules, bus, Arc::new(pool.clone()));
    let mut part = router.enroll(scenario.root).await.unwrap();

    router.handle_request(&mut part, Request::Get).await.unwrap();
    router
        .handle_request(&mut part, Request::Post(answer("p1", "a")))
        .await
        .unwrap();
    router.handle_request(&mut part, Request::Get).await.unwrap();

    let done = settle(&router, &mut part, Request::Post(answer("p2", "b"))).await;
    assert!(matches!(done, Artifact::Redirect { .. }));
    assert_eq!(var_of(part.tree.current_page().unwrap().unwrap()), GROWN_VAR);
    assert!(part.jobs.is_empty());
    assert_eq!(pool.running(), 0);

    pool.shutdown().await;
}
