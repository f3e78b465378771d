use std::path::PathBuf;

use super::*;
use crate::system::BuildEvent;
use crate::testing::{TestWorkspace, manifest};

fn push(repo: &str, branch: &str, commit: &str) -> PushEvent {
    PushEvent {
        repo: PathBuf::from(repo),
        branch: branch.into(),
        commit: commit.into(),
    }
}

fn widget_manifest() -> String {
    manifest(
        "chat-widget",
        &[("chat", "workspace:*"), ("react", "^18.2.0")],
    )
}

fn chat_manifest() -> String {
    manifest("chat", &[("lodash", "^4.17.0")])
}

fn started() -> (TestWorkspace, Arc<BuildSystem>) {
    let ws = TestWorkspace::chat_workspace();
    let system = ws.system();
    system.start().unwrap();
    ws.bundler.clear();
    (ws, system)
}

mod routing {
    use super::*;

    #[test]
    fn library_push_rebuilds_dependents_only() {
        let (ws, system) = started();
        let before = system.snapshot();

        ws.commit("libs/chat", "main", "chat@2", &chat_manifest());
        let outcome = handle_push(&system, &push("libs/chat", "refs/heads/main", "chat@2")).unwrap();

        let PushOutcome::Incremental { changes, report, .. } = outcome else {
            panic!("expected fast path, got {outcome:?}");
        };
        assert_eq!(changes.changed, ["chat", "chat-widget"]);
        assert_eq!(report.built, ["chat-widget"]);
        assert_eq!(ws.bundler.calls(), ["chat-widget"]);

        let after = system.snapshot();
        assert_eq!(after.ev_map["settings"], before.ev_map["settings"]);
        assert_eq!(after.refs["chat"], "chat@2");
        assert_eq!(after.graph.get("chat").unwrap().commit, "chat@2");
    }

    #[test]
    fn fast_path_is_persisted() {
        let (ws, system) = started();
        ws.commit("libs/chat", "main", "chat@2", &chat_manifest());
        handle_push(&system, &push("libs/chat", "main", "chat@2")).unwrap();

        let restarted = ws.system();
        let report = restarted.start().unwrap();
        assert_eq!(restarted.snapshot().ev_map, system.snapshot().ev_map);
        assert!(report.built.is_empty());
    }

    #[test]
    fn absolute_repo_path_accepted() {
        let (ws, system) = started();
        ws.commit("panels/settings", "main", "settings@2", &manifest("settings", &[("react", "^18.2.0")]));

        let repo = ws.path("panels/settings");
        let event = PushEvent {
            repo,
            branch: "main".into(),
            commit: "settings@2".into(),
        };
        let outcome = handle_push(&system, &event).unwrap();
        assert!(matches!(outcome, PushOutcome::Incremental { ref unit, .. } if unit == "settings"));
        assert_eq!(ws.bundler.calls(), ["settings"]);
    }

    #[test]
    fn same_commit_is_a_no_op() {
        let (_ws, system) = started();
        let outcome = handle_push(&system, &push("libs/chat", "main", "chat@1")).unwrap();
        assert_eq!(outcome, PushOutcome::Unchanged { unit: "chat".into() });
    }

    #[test]
    fn secondary_main_branch_push_ignored() {
        let (ws, system) = started();

        ws.commit("libs/chat", "master", "chat@m2", &chat_manifest());
        let outcome = handle_push(&system, &push("libs/chat", "master", "chat@m2")).unwrap();
        assert!(matches!(outcome, PushOutcome::Ignored { .. }));

        let outcome = recompute(&system).unwrap();
        assert!(matches!(outcome, PushOutcome::Rediscovered { ref changes, .. } if changes.is_empty()));
        assert_eq!(system.snapshot().refs["chat"], "chat@1");
        assert!(ws.bundler.calls().is_empty());
    }

    fn master_only_workspace() -> (TestWorkspace, Arc<BuildSystem>) {
        let ws = TestWorkspace::new();
        std::fs::create_dir_all(ws.path("panels/solo")).unwrap();
        ws.commit("panels/solo", "master", "solo@1", &manifest("solo", &[]));
        let system = ws.system();
        system.start().unwrap();
        ws.bundler.clear();
        (ws, system)
    }

    #[test]
    fn master_only_repo_survives_recompute() {
        let (ws, system) = master_only_workspace();
        assert_eq!(system.snapshot().graph.get("solo").unwrap().branch.as_deref(), Some("master"));

        ws.commit("panels/solo", "master", "solo@2", &manifest("solo", &[]));
        let outcome = handle_push(&system, &push("panels/solo", "master", "solo@2")).unwrap();
        assert!(matches!(outcome, PushOutcome::Incremental { .. }));
        let after_push = system.snapshot();

        let outcome = recompute(&system).unwrap();
        assert!(matches!(outcome, PushOutcome::Rediscovered { ref changes, .. } if changes.is_empty()));
        let state = system.snapshot();
        assert_eq!(state.refs["solo"], "solo@2");
        assert_eq!(state.ev_map, after_push.ev_map);
        assert_eq!(ws.bundler.calls(), ["solo"]);
    }

    #[test]
    fn preferred_main_branch_push_rediscovers() {
        let (ws, system) = master_only_workspace();

        ws.commit("panels/solo", "main", "solo@3", &manifest("solo", &[]));
        let outcome = handle_push(&system, &push("panels/solo", "main", "solo@3")).unwrap();
        assert!(matches!(outcome, PushOutcome::Rediscovered { .. }));

        let state = system.snapshot();
        assert_eq!(state.refs["solo"], "solo@3");
        assert_eq!(state.graph.get("solo").unwrap().branch.as_deref(), Some("main"));
    }

    #[test]
    fn untracked_pushes_ignored() {
        let (ws, system) = started();

        let outcome = handle_push(&system, &push("libs/unknown", "main", "x")).unwrap();
        assert!(matches!(outcome, PushOutcome::Ignored { .. }));

        ws.commit("libs/chat", "feature", "chat-f1", &chat_manifest());
        let outcome = handle_push(&system, &push("libs/chat", "feature", "chat-f1")).unwrap();
        assert!(matches!(outcome, PushOutcome::Ignored { .. }));
        assert_eq!(system.snapshot().refs["chat"], "chat@1");
        assert!(ws.bundler.calls().is_empty());
    }
}

mod rediscovery {
    use super::*;

    #[test]
    fn manifest_change_rediscovers() {
        let (ws, system) = started();

        ws.commit(
            "panels/settings",
            "main",
            "settings@2",
            &manifest("settings", &[("chat", "workspace:*")]),
        );
        let outcome = handle_push(&system, &push("panels/settings", "main", "settings@2")).unwrap();

        let PushOutcome::Rediscovered { changes, report } = outcome else {
            panic!("expected rediscovery, got {outcome:?}");
        };
        assert_eq!(changes.changed, ["settings"]);
        assert_eq!(report.built, ["settings"]);

        let state = system.snapshot();
        let settings = state.graph.get("settings").unwrap();
        assert!(settings.internal_deps.contains("chat"));
        assert_eq!(state.graph.get_reverse_deps("chat").unwrap().len(), 2);
    }

    #[test]
    fn script_only_manifest_edit_keeps_fast_path() {
        let (ws, system) = started();

        let mut edited: serde_json::Value = serde_json::from_str(&chat_manifest()).unwrap();
        edited["scripts"] = serde_json::json!({ "test": "vitest" });
        ws.commit("libs/chat", "main", "chat@2", &edited.to_string());

        let outcome = handle_push(&system, &push("libs/chat", "main", "chat@2")).unwrap();
        assert!(matches!(outcome, PushOutcome::Incremental { .. }));
    }

    #[test]
    fn malformed_manifest_keeps_last_good_state() {
        let (ws, system) = started();
        let before = system.snapshot();

        ws.commit("libs/chat", "main", "chat@2", "{ \"name\": ");
        let result = handle_push(&system, &push("libs/chat", "main", "chat@2"));
        assert!(result.is_err());

        let after = system.snapshot();
        assert_eq!(after.ev_map, before.ev_map);
        assert_eq!(after.refs["chat"], "chat@1");
        assert!(ws.bundler.calls().is_empty());
    }

    #[test]
    fn cycle_keeps_last_good_state() {
        let (ws, system) = started();
        let before = system.snapshot();

        ws.commit(
            "libs/chat",
            "main",
            "chat@2",
            &manifest("chat", &[("chat-widget", "workspace:*")]),
        );
        let err = handle_push(&system, &push("libs/chat", "main", "chat@2")).unwrap_err();
        assert!(format!("{err:#}").contains("cycle"));

        let after = system.snapshot();
        assert_eq!(after.ev_map, before.ev_map);
        assert_eq!(after.graph.len(), before.graph.len());
        assert!(!after.graph.get("chat").unwrap().internal_deps.contains("chat-widget"));
    }

    #[test]
    fn tracked_ref_push_rebuilds_pinning_unit() {
        let ws = TestWorkspace::new();
        ws.unit("libs/chat", "chat@1", &chat_manifest());
        ws.commit("libs/chat", "next", "chat-next@1", &chat_manifest());
        let pinned = serde_json::json!({
            "name": "chat-widget",
            "dependencies": { "chat": "workspace:*" },
            "bindery": { "depRefs": { "chat": { "branch": "next" } } }
        })
        .to_string();
        ws.unit("panels/chat-widget", "widget@1", &pinned);

        let system = ws.system();
        system.start().unwrap();
        ws.bundler.clear();
        let before = system.snapshot();
        assert_eq!(before.graph.get("chat-widget").unwrap().pinned["chat"], "chat-next@1");

        ws.commit("libs/chat", "next", "chat-next@2", &chat_manifest());
        let outcome = handle_push(&system, &push("libs/chat", "refs/heads/next", "chat-next@2")).unwrap();

        let PushOutcome::Rediscovered { changes, .. } = outcome else {
            panic!("expected rediscovery, got {outcome:?}");
        };
        assert_eq!(changes.changed, ["chat-widget"]);
        assert_eq!(ws.bundler.calls(), ["chat-widget"]);

        let after = system.snapshot();
        assert_eq!(after.graph.get("chat-widget").unwrap().pinned["chat"], "chat-next@2");
        assert_eq!(after.ev_map["chat"], before.ev_map["chat"]);
    }

    #[test]
    fn main_push_refreshes_dependent_pins() {
        let ws = TestWorkspace::new();
        ws.unit("libs/chat", "chat@1", &chat_manifest());
        let pinned = serde_json::json!({
            "name": "chat-widget",
            "dependencies": { "chat": "workspace:*" },
            "bindery": { "depRefs": { "chat": { "branch": "main" } } }
        })
        .to_string();
        ws.unit("panels/chat-widget", "widget@1", &pinned);

        let system = ws.system();
        system.start().unwrap();
        ws.bundler.clear();

        ws.commit("libs/chat", "main", "chat@2", &chat_manifest());
        let outcome = handle_push(&system, &push("libs/chat", "main", "chat@2")).unwrap();
        let PushOutcome::Rediscovered { changes, .. } = outcome else {
            panic!("expected rediscovery, got {outcome:?}");
        };
        assert_eq!(changes.changed, ["chat", "chat-widget"]);
        assert_eq!(ws.bundler.calls(), ["chat-widget"]);

        let after_push = system.snapshot();
        assert_eq!(after_push.graph.get("chat-widget").unwrap().pinned["chat"], "chat@2");

        // A later full recompute agrees and rebuilds nothing.
        ws.bundler.clear();
        let outcome = recompute(&system).unwrap();
        assert!(matches!(outcome, PushOutcome::Rediscovered { ref changes, .. } if changes.is_empty()));
        assert_eq!(system.snapshot().ev_map, after_push.ev_map);
        assert!(ws.bundler.calls().is_empty());
    }

    #[test]
    fn recompute_without_changes_builds_nothing() {
        let (ws, system) = started();
        let outcome = recompute(&system).unwrap();
        let PushOutcome::Rediscovered { changes, report } = outcome else {
            panic!("expected rediscovery, got {outcome:?}");
        };
        assert!(changes.is_empty());
        assert!(report.is_empty());
        assert!(ws.bundler.calls().is_empty());
    }
}

mod actor {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn pushes_are_serialized() {
        let (ws, system) = started();
        let (handle, task) = Orchestrator::spawn(Arc::clone(&system));

        ws.commit("libs/chat", "main", "chat@2", &chat_manifest());
        ws.commit("panels/settings", "main", "settings@2", &manifest("settings", &[("react", "^18.2.0")]));
        ws.commit("panels/chat-widget", "main", "widget@2", &widget_manifest());

        let (a, b, c) = tokio::join!(
            handle.push(push("libs/chat", "main", "chat@2")),
            handle.push(push("panels/settings", "main", "settings@2")),
            handle.push(push("panels/chat-widget", "main", "widget@2")),
        );
        for outcome in [a, b, c] {
            assert!(matches!(outcome.unwrap(), PushOutcome::Incremental { .. }));
        }

        let state = system.snapshot();
        assert_eq!(state.refs["chat"], "chat@2");
        assert_eq!(state.refs["settings"], "settings@2");
        assert_eq!(state.refs["chat-widget"], "widget@2");

        // Same result as computing the final workspace from scratch.
        let fresh = TestWorkspace::chat_workspace();
        fresh.commit("libs/chat", "main", "chat@2", &chat_manifest());
        fresh.commit("panels/settings", "main", "settings@2", &manifest("settings", &[("react", "^18.2.0")]));
        fresh.commit("panels/chat-widget", "main", "widget@2", &widget_manifest());
        let scratch = fresh.system();
        scratch.start().unwrap();
        assert_eq!(scratch.snapshot().ev_map, state.ev_map);

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_push_lands_after_first_is_persisted() {
        let (ws, system) = started();
        ws.bundler.watch(ws.config.workspace.state_dir.join("ref-state.json"));
        let mut events = system.subscribe();
        let (handle, task) = Orchestrator::spawn(Arc::clone(&system));

        ws.commit("libs/chat", "main", "chat@2", &chat_manifest());
        ws.commit("panels/settings", "main", "settings@2", &manifest("settings", &[("react", "^18.2.0")]));

        let (a, b) = tokio::join!(
            handle.push(push("libs/chat", "main", "chat@2")),
            handle.push(push("panels/settings", "main", "settings@2")),
        );
        a.unwrap();
        b.unwrap();

        // Each push builds exactly one unit; map it back to the push.
        let pushed = |built: &str| match built {
            "chat-widget" => ("chat", "chat@2"),
            _ => ("settings", "settings@2"),
        };
        let observed = ws.bundler.observed();
        assert_eq!(observed.len(), 2);
        let (first_built, first_doc) = &observed[0];
        let (second_built, second_doc) = &observed[1];
        let (first, second) = (pushed(first_built.as_str()), pushed(second_built.as_str()));
        assert_ne!(first.0, second.0);

        let first_doc: serde_json::Value = serde_json::from_str(first_doc).unwrap();
        assert_eq!(first_doc[first.0], first.1);
        assert_ne!(first_doc[second.0], second.1);

        let second_doc: serde_json::Value = serde_json::from_str(second_doc).unwrap();
        assert_eq!(second_doc[first.0], first.1);
        assert_eq!(second_doc[second.0], second.1);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        let first_done = seen
            .iter()
            .position(|e| matches!(e, BuildEvent::BuildComplete { unit, .. } if unit == first_built))
            .unwrap();
        let second_detected = seen
            .iter()
            .position(|e| {
                matches!(e, BuildEvent::ChangeDetected { changes }
                    if changes.changed.iter().any(|u| u == second.0))
            })
            .unwrap();
        assert!(first_done < second_detected);

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_does_not_stop_the_queue() {
        let (ws, system) = started();
        let (handle, task) = Orchestrator::spawn(Arc::clone(&system));

        ws.commit("libs/chat", "main", "chat@2", "not json");
        assert!(handle.push(push("libs/chat", "main", "chat@2")).await.is_err());

        ws.commit("panels/settings", "main", "settings@2", &manifest("settings", &[("react", "^18.2.0")]));
        let outcome = handle.push(push("panels/settings", "main", "settings@2")).await.unwrap();
        assert!(matches!(outcome, PushOutcome::Incremental { .. }));

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn events_follow_a_push() {
        let (ws, system) = started();
        let mut events = system.subscribe();
        let (handle, task) = Orchestrator::spawn(Arc::clone(&system));

        ws.commit("libs/chat", "main", "chat@2", &chat_manifest());
        handle.push(push("libs/chat", "main", "chat@2")).await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen[0], BuildEvent::ChangeDetected { ref changes } if changes.len() == 2));
        assert!(seen.iter().any(|e| matches!(e, BuildEvent::BuildStarted { unit, .. } if unit == "chat-widget")));
        assert!(seen.iter().any(|e| matches!(e, BuildEvent::BuildComplete { unit, .. } if unit == "chat-widget")));
        assert!(seen.iter().all(|e| e.unit() != Some("settings")));

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn gc_waits_for_queued_pushes() {
        let (ws, system) = started();
        let (handle, task) = Orchestrator::spawn(Arc::clone(&system));

        ws.commit("libs/chat", "main", "chat@2", &chat_manifest());
        let (pushed, collected) = tokio::join!(
            handle.push(push("libs/chat", "main", "chat@2")),
            handle.gc(None),
        );
        pushed.unwrap();
        // Only the superseded chat-widget build goes.
        assert_eq!(collected.unwrap().freed, 1);

        ws.bundler.clear();
        system.get_build("chat-widget").unwrap();
        system.get_build("settings").unwrap();
        assert!(ws.bundler.calls().is_empty());

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn recompute_goes_through_the_queue() {
        let (_ws, system) = started();
        let mut events = system.subscribe();
        let (handle, task) = Orchestrator::spawn(Arc::clone(&system));

        let outcome = handle.recompute().await.unwrap();
        assert!(matches!(outcome, PushOutcome::Rediscovered { .. }));
        assert_eq!(events.try_recv().unwrap(), BuildEvent::GraphUpdated { units: 3 });

        handle.shutdown().await;
        task.await.unwrap();
    }
}
