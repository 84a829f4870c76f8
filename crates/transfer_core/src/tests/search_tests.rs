use super::*;
use crate::test_support::{org_unit_page, ScriptedEngine};
use shared::error::ApiError;

fn search_for(engine: &Arc<ScriptedEngine>, session: &CancellationToken) -> Arc<LocationSearch> {
    Arc::new(LocationSearch::new(engine.clone(), 2, 15, session))
}

#[tokio::test]
async fn short_queries_issue_no_request_and_clear_results() {
    let engine = ScriptedEngine::new();
    engine.on_query(
        "organisationUnits|displayName:ilike:ka",
        Ok(org_unit_page(&[("OU1", "Kampala")])),
    );
    let session = CancellationToken::new();
    let search = search_for(&engine, &session);

    assert_eq!(search.run("ka").await, SearchCommit::Results(1));
    assert_eq!(search.state().await.results.len(), 1);

    for query in ["", "k", " k ", "   "] {
        assert_eq!(search.run(query).await, SearchCommit::Cleared);
        let state = search.state().await;
        assert!(state.results.is_empty());
        assert!(state.error.is_none());
    }
    assert_eq!(engine.queries().len(), 1);
}

#[tokio::test]
async fn search_request_uses_ilike_filter_and_paging() {
    let engine = ScriptedEngine::new();
    engine.on_query("organisationUnits", Ok(org_unit_page(&[])));
    let session = CancellationToken::new();
    let search = search_for(&engine, &session);

    search.run("  Gulu ").await;

    let queries = engine.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(
        queries[0].params,
        vec![
            ("fields".to_string(), "id,displayName,path".to_string()),
            ("filter".to_string(), "displayName:ilike:Gulu".to_string()),
            ("paging".to_string(), "true".to_string()),
            ("pageSize".to_string(), "15".to_string()),
        ]
    );
}

#[tokio::test]
async fn transport_failure_surfaces_unavailable_and_empties_results() {
    let engine = ScriptedEngine::new();
    engine.on_query(
        "organisationUnits|displayName:ilike:ka",
        Ok(org_unit_page(&[("OU1", "Kampala")])),
    );
    engine.on_query(
        "organisationUnits|displayName:ilike:kam",
        Err(ApiError::transport("connection reset")),
    );
    let session = CancellationToken::new();
    let search = search_for(&engine, &session);

    search.run("ka").await;
    assert_eq!(search.run("kam").await, SearchCommit::Failed);

    let state = search.state().await;
    assert!(state.results.is_empty());
    assert!(matches!(state.error, Some(SearchError::Unavailable(_))));
    assert_eq!(state.last_query, "kam");
}

#[tokio::test]
async fn superseded_response_never_overwrites_newer_results() {
    let engine = ScriptedEngine::new();
    engine.on_query(
        "organisationUnits|displayName:ilike:ka",
        Ok(org_unit_page(&[("OLD1", "Kabale"), ("OLD2", "Kasese")])),
    );
    engine.on_query(
        "organisationUnits|displayName:ilike:kamp",
        Ok(org_unit_page(&[("NEW", "Kampala")])),
    );
    let gate = engine.gate("organisationUnits|displayName:ilike:ka");
    let session = CancellationToken::new();
    let search = search_for(&engine, &session);

    let slow = {
        let search = search.clone();
        tokio::spawn(async move { search.run("ka").await })
    };
    gate.entered.notified().await;

    assert_eq!(search.run("kamp").await, SearchCommit::Results(1));

    gate.release.notify_one();
    assert_eq!(slow.await.expect("join"), SearchCommit::Stale);

    let state = search.state().await;
    assert_eq!(state.results.len(), 1);
    assert_eq!(state.results[0].display_name, "Kampala");
    assert_eq!(state.last_query, "kamp");
}

#[tokio::test]
async fn teardown_discards_in_flight_search() {
    let engine = ScriptedEngine::new();
    engine.on_query("organisationUnits", Ok(org_unit_page(&[("OU1", "Kampala")])));
    let gate = engine.gate("organisationUnits|displayName:ilike:kam");
    let session = CancellationToken::new();
    let search = search_for(&engine, &session);

    let pending = {
        let search = search.clone();
        tokio::spawn(async move { search.run("kam").await })
    };
    gate.entered.notified().await;
    session.cancel();

    assert_eq!(pending.await.expect("join"), SearchCommit::Stale);
    assert!(search.state().await.results.is_empty());
}

#[tokio::test]
async fn earlier_claim_loses_even_when_it_runs_last() {
    let engine = ScriptedEngine::new();
    engine.on_query(
        "organisationUnits|displayName:ilike:ka",
        Ok(org_unit_page(&[("OLD", "Kabale")])),
    );
    engine.on_query(
        "organisationUnits|displayName:ilike:kam",
        Ok(org_unit_page(&[("NEW", "Kampala")])),
    );
    let session = CancellationToken::new();
    let search = search_for(&engine, &session);

    let older = search.begin();
    let newer = search.begin();
    assert_eq!(search.run_ticketed(newer, "kam").await, SearchCommit::Results(1));
    assert_eq!(search.run_ticketed(older, "ka").await, SearchCommit::Stale);

    let state = search.state().await;
    assert_eq!(state.results[0].display_name, "Kampala");
    assert_eq!(state.last_query, "kam");
    assert_eq!(engine.queries().len(), 1, "superseded claim never reaches the engine");
}

#[tokio::test]
async fn superseded_claim_does_not_mark_loading() {
    let engine = ScriptedEngine::new();
    engine.on_query("organisationUnits", Ok(org_unit_page(&[("OU1", "Kampala")])));
    let session = CancellationToken::new();
    let search = search_for(&engine, &session);

    let older = search.begin();
    assert_eq!(search.run("k").await, SearchCommit::Cleared);
    assert_eq!(search.run_ticketed(older, "kampala").await, SearchCommit::Stale);

    let state = search.state().await;
    assert!(!state.loading);
    assert!(state.results.is_empty());
    assert!(engine.queries().is_empty());
}
