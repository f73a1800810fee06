//! Coordination session scenarios over the in-memory transport.
//!
//! Participants are scripted with an auto-responder; every mode timeout is
//! shortened so missing participants cost milliseconds, not a minute.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use decision_coordination::coordination::{
    ChannelTransport, CoordinationMode, DecisionCoordinationSystem, SessionStatus,
    SharedCoordinationSystem,
};
use decision_coordination::decision::{DecisionStatus, DecisionType};
use decision_coordination::events::EventFilter;
use decision_coordination::{
    CoordinationConfig, CoordinationEvent, DecisionEngine, EngineConfig, EventBus, ModeOverride,
    SharedEventBus,
};
use serde_json::{json, Value};

fn fast_config() -> CoordinationConfig {
    let mut config = CoordinationConfig::default();
    for mode in CoordinationMode::all() {
        config.modes.insert(
            *mode,
            ModeOverride {
                timeout_secs: Some(1),
                ..Default::default()
            },
        );
    }
    config
}

fn build(transport: ChannelTransport, config: CoordinationConfig) -> (SharedCoordinationSystem, SharedEventBus) {
    let bus = EventBus::new().shared();
    let engine = DecisionEngine::new(EngineConfig::default())
        .with_event_bus(bus.clone())
        .shared();
    let system =
        DecisionCoordinationSystem::new(engine, Arc::new(transport), bus.clone(), config).shared();
    (system, bus)
}

fn agents(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Responder answering with a fixed proposal per agent
fn proposals(pairs: &'static [(&'static str, &'static str)]) -> ChannelTransport {
    ChannelTransport::default().with_auto_responder(move |msg| {
        pairs
            .iter()
            .find(|(agent, _)| *agent == msg.to)
            .map(|(_, proposal)| json!({ "decision": proposal }))
    })
}

// ── Happy path ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_consensus_path_is_monotonic() {
    let transport = proposals(&[("a", "ship"), ("b", "ship"), ("c", "ship")]);
    let (system, bus) = build(transport, fast_config());
    let mut events = bus.subscribe();

    let id = system
        .initiate_coordination_session(
            "release-42",
            DecisionType::Coordination,
            agents(&["a", "b", "c"]),
            CoordinationMode::Consensus,
        )
        .await;
    let session = system.await_session(&id).await.unwrap();

    assert_eq!(
        session.status_path(),
        vec![
            SessionStatus::Active,
            SessionStatus::GatheringInputs,
            SessionStatus::InputsGathered,
            SessionStatus::Deliberating,
            SessionStatus::DeliberationComplete,
            SessionStatus::BuildingConsensus,
            SessionStatus::ConsensusReached,
            SessionStatus::Finalizing,
            SessionStatus::Completed,
        ]
    );
    assert!(session.consensus_reached);
    assert_eq!(session.consensus_score, Some(1.0));
    assert!(session.end_time.is_some());

    let decision = session.final_decision.as_ref().unwrap();
    assert_eq!(decision.result, json!("ship"));
    assert_eq!(decision.status, DecisionStatus::Completed);
    assert_eq!(decision.participating_agents.as_ref().unwrap().len(), 3);

    let stored = system.engine().get_decision("release-42").await.unwrap();
    assert_eq!(&stored, decision);
    assert_eq!(system.engine().get_metrics().await.collaborative_decisions, 1);

    // One StatusChanged per transition, bracketed by start and end.
    let mut changes = 0;
    let mut saw_start = false;
    let mut saw_end = false;
    while let Ok(event) = events.try_recv() {
        match event {
            CoordinationEvent::SessionStarted { .. } => saw_start = true,
            CoordinationEvent::StatusChanged { .. } => changes += 1,
            CoordinationEvent::SessionEnded { status, .. } => {
                assert_eq!(status, SessionStatus::Completed);
                saw_end = true;
            }
            _ => {}
        }
    }
    assert!(saw_start && saw_end);
    assert_eq!(changes, session.transitions.len());
}

#[tokio::test]
async fn test_final_decision_sent_to_every_participant() {
    let transport = Arc::new(proposals(&[("a", "x"), ("b", "x")]));
    let bus = EventBus::new().shared();
    let engine = DecisionEngine::new(EngineConfig::default()).shared();
    let system = DecisionCoordinationSystem::new(
        engine,
        transport.clone(),
        bus,
        fast_config(),
    )
    .shared();

    let id = system
        .initiate_coordination_session(
            "d-notify",
            DecisionType::Coordination,
            agents(&["a", "b"]),
            CoordinationMode::Majority,
        )
        .await;
    system.await_session(&id).await.unwrap();

    for agent in ["a", "b"] {
        let kinds: Vec<String> = transport
            .messages_for(agent)
            .await
            .into_iter()
            .map(|m| m.message_type)
            .collect();
        assert_eq!(kinds, vec!["input_request", "final_decision"]);
    }
}

// ── Modes ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_consensus_mode_disagreement_fails() {
    let mut config = fast_config();
    config.modes.insert(
        CoordinationMode::Consensus,
        ModeOverride {
            retry_attempts: Some(0),
            timeout_secs: Some(1),
            ..Default::default()
        },
    );
    let transport = proposals(&[("a", "ship"), ("b", "hold")]);
    let (system, _) = build(transport, config);

    let id = system
        .initiate_coordination_session(
            "d-split",
            DecisionType::Coordination,
            agents(&["a", "b"]),
            CoordinationMode::Consensus,
        )
        .await;
    let session = system.await_session(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.consensus_score, Some(0.0));
    assert!(session.final_decision.is_none());
    assert!(system.engine().get_decision("d-split").await.is_none());
}

#[tokio::test]
async fn test_majority_two_of_three() {
    let transport = proposals(&[("a", "blue"), ("b", "green"), ("c", "green")]);
    let (system, _) = build(transport, fast_config());

    let id = system
        .initiate_coordination_session(
            "d-vote",
            DecisionType::Coordination,
            agents(&["a", "b", "c"]),
            CoordinationMode::Majority,
        )
        .await;
    let session = system.await_session(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    let score = session.consensus_score.unwrap();
    assert!((score - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(session.final_decision.unwrap().result, json!("green"));
}

#[tokio::test]
async fn test_expert_opinion_picks_highest_expertise() {
    let transport = ChannelTransport::default().with_auto_responder(|msg| {
        let expertise = if msg.to == "senior" { 0.95 } else { 0.2 };
        Some(json!({"decision": format!("plan-{}", msg.to), "expertise_score": expertise}))
    });
    let (system, _) = build(transport, fast_config());

    let id = system
        .initiate_coordination_session(
            "d-expert",
            DecisionType::Prioritization,
            agents(&["junior", "senior"]),
            CoordinationMode::ExpertOpinion,
        )
        .await;
    let session = system.await_session(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    let decision = session.final_decision.unwrap();
    assert_eq!(decision.result, json!("plan-senior"));
    assert_eq!(decision.decision_type, DecisionType::Prioritization);
}

#[tokio::test]
async fn test_collaborative_merges_inputs() {
    let transport = ChannelTransport::default().with_auto_responder(|_| {
        Some(json!({"decision": {"owner": "platform"}, "score": 1.5}))
    });
    let (system, _) = build(transport, fast_config());

    let id = system
        .initiate_coordination_session(
            "d-collab",
            DecisionType::ConflictResolution,
            agents(&["a", "b"]),
            CoordinationMode::Collaborative,
        )
        .await;
    let session = system.await_session(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    let result: Value = session.final_decision.unwrap().result;
    assert_eq!(result["participant_count"], 2);
    assert_eq!(result["total_score"], 3.0);
    assert_eq!(result["inputs"]["b"]["owner"], "platform");
}

#[tokio::test]
async fn test_disagreeing_experts_do_not_reach_consensus() {
    let mut config = fast_config();
    config.modes.insert(
        CoordinationMode::ExpertOpinion,
        ModeOverride {
            retry_attempts: Some(0),
            timeout_secs: Some(1),
            ..Default::default()
        },
    );
    let transport = ChannelTransport::default().with_auto_responder(|msg| {
        Some(json!({"decision": format!("plan-{}", msg.to), "expertise_score": 0.9}))
    });
    let (system, _) = build(transport, config);

    let id = system
        .initiate_coordination_session(
            "d-experts-split",
            DecisionType::Prioritization,
            agents(&["x", "y", "z"]),
            CoordinationMode::ExpertOpinion,
        )
        .await;
    let session = system.await_session(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Failed);
    let score = session.consensus_score.unwrap();
    assert!((score - 1.0 / 3.0).abs() < 1e-9);
    assert!(system.engine().get_decision("d-experts-split").await.is_none());
}

// ── Partial input, retries, failure ────────────────────────────────

#[tokio::test]
async fn test_missing_participant_sets_partial_input() {
    // A lone answer has full support; half coverage scores 0.5.
    let mut config = fast_config();
    config.modes.insert(
        CoordinationMode::Hierarchical,
        ModeOverride {
            threshold: Some(0.5),
            retry_attempts: Some(0),
            timeout_secs: Some(1),
        },
    );
    let transport = proposals(&[("boss", "reorg")]);
    let (system, _) = build(transport, config);

    let id = system
        .initiate_coordination_session(
            "d-partial",
            DecisionType::Coordination,
            agents(&["boss", "absent"]),
            CoordinationMode::Hierarchical,
        )
        .await;
    let session = system.await_session(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.partial_input);
    assert_eq!(session.responses_received, 1);
    let decision = session.final_decision.unwrap();
    assert!(decision.partial_input);
    assert_eq!(decision.participating_agents, Some(vec!["boss".to_string()]));
}

#[tokio::test]
async fn test_retry_exhaustion_fails_after_one_retry() {
    let mut config = fast_config();
    config.modes.insert(
        CoordinationMode::Consensus,
        ModeOverride {
            retry_attempts: Some(1),
            timeout_secs: Some(1),
            ..Default::default()
        },
    );
    let rounds = Arc::new(AtomicUsize::new(0));
    let counter = rounds.clone();
    let transport = ChannelTransport::default().with_auto_responder(move |msg| {
        if msg.to == "a" {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Some(json!({"decision": msg.to.clone()}))
    });
    let (system, bus) = build(transport, config);
    let mut ended = bus.subscribe_filtered(EventFilter::Kinds(vec!["session_ended"]));

    let id = system
        .initiate_coordination_session(
            "d-retry",
            DecisionType::Coordination,
            agents(&["a", "b"]),
            CoordinationMode::Consensus,
        )
        .await;
    let session = system.await_session(&id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.retry_count, 1);
    assert_eq!(rounds.load(Ordering::SeqCst), 2);
    assert!(session
        .failure_reason
        .as_deref()
        .unwrap()
        .contains("consensus not reached"));

    let path = session.status_path();
    assert_eq!(
        path.iter().filter(|s| **s == SessionStatus::Retrying).count(),
        1
    );
    assert_eq!(path.last(), Some(&SessionStatus::Failed));
    // Retrying -> Active is the only step back.
    for pair in path.windows(2) {
        if pair[1] == SessionStatus::Active {
            assert_eq!(pair[0], SessionStatus::Retrying);
        }
    }

    match ended.recv().await.unwrap() {
        CoordinationEvent::SessionEnded {
            session_id,
            status,
            retries,
            ..
        } => {
            assert_eq!(session_id, id);
            assert_eq!(status, SessionStatus::Failed);
            assert_eq!(retries, 1);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    let metrics = system.coordination_metrics().await;
    assert_eq!(metrics.sessions_failed, 1);
    assert_eq!(metrics.sessions_completed, 0);
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let transport = proposals(&[("a", "x"), ("b", "x")]);
    let (system, _) = build(transport, fast_config());

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            system
                .initiate_coordination_session(
                    &format!("d-{}", i),
                    DecisionType::Coordination,
                    agents(&["a", "b"]),
                    CoordinationMode::Majority,
                )
                .await,
        );
    }
    for id in &ids {
        let session = system.await_session(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
    }

    let metrics = system.coordination_metrics().await;
    assert_eq!(metrics.sessions_started, 5);
    assert_eq!(metrics.sessions_completed, 5);
    assert_eq!(metrics.consensus_rate, 1.0);
    assert_eq!(metrics.active_sessions, 0);
    assert_eq!(system.session_history().await.len(), 5);
}
