//! End-to-end call flows through the service with a fake switch.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use call_router::config::parse_config;
use call_router::routing::{ComposeOutcome, Halt};
use call_router::session::{CallStatus, Command, SessionError};
use call_router::{Composer, Flow, Guard, HandlerError, Router, SessionId};

mod common;
use common::{FakeSwitch, DEST};

const WELCOME: &str = r#"
    [[apps]]
    id = "default"

    [[apps.routers]]
    name = "outbound_only"
    guards = { Caller-Direction = "outbound" }
    reject_on_guard = false

    [[apps.routers]]
    name = "inbound"
    guards = { Caller-Direction = "inbound" }
    reject_code = 407

    [[apps.routers.routes]]
    name = "welcome"
    pattern = "^1\\d\\d$"
    actions = [
        { type = "answer" },
        { type = "playback", resource = "ivr/welcome.wav", until = "PLAYBACK_STOP" },
        { type = "hangup" },
    ]
"#;

#[tokio::test]
async fn test_configured_welcome_flow() {
    let composer = parse_config(WELCOME).unwrap().build_composer().unwrap();
    let mut switch = FakeSwitch::new(composer);

    let task = switch.call("c1", &[("Caller-Direction", "inbound"), (DEST, "101")]);

    assert_eq!(switch.expect("c1").await, Command::Answer);
    switch.event("c1", "CHANNEL_ANSWER");
    assert_eq!(
        switch.expect("c1").await,
        Command::Playback { resource: "ivr/welcome.wav".into() }
    );
    switch.event("c1", "PLAYBACK_STOP");
    assert!(matches!(switch.expect("c1").await, Command::Hangup { .. }));
    switch.event("c1", "CHANNEL_HANGUP");

    match task.await.unwrap() {
        ComposeOutcome::Handled { router, report, .. } => {
            assert_eq!(router, "inbound");
            assert_eq!(report.invoked, vec!["welcome"]);
            assert!(matches!(report.halt, Halt::Completed));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(switch.service.active_sessions(), 0);
}

#[tokio::test]
async fn test_configured_guard_rejection() {
    let composer = parse_config(WELCOME).unwrap().build_composer().unwrap();
    let mut switch = FakeSwitch::new(composer);

    let task = switch.call("c1", &[("Caller-Direction", "sideways"), (DEST, "101")]);

    assert_eq!(switch.expect("c1").await, Command::Respond { code: 407 });
    match task.await.unwrap() {
        ComposeOutcome::Rejected { router, .. } => assert_eq!(router, "inbound"),
        other => panic!("unexpected outcome {:?}", other),
    }
    switch.assert_idle();
}

#[tokio::test]
async fn test_answer_then_stop_routing() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut router = Router::new("r");
    router
        .route("101")
        .field("did")
        .to_fn(|sess, _r, _m| async move {
            sess.answer().await?;
            Ok::<_, HandlerError>(Flow::StopRouting)
        })
        .unwrap();
    {
        let log = log.clone();
        router
            .route("101")
            .field("did")
            .to_fn(move |sess, _r, _m| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push("handler2");
                    sess.hangup().await?;
                    Ok::<_, HandlerError>(Flow::Continue)
                }
            })
            .unwrap();
    }
    let mut composer = Composer::new();
    composer.load_app(router, "default");
    let mut switch = FakeSwitch::new(composer);

    let task = switch.call("c1", &[("did", "101")]);
    assert_eq!(switch.expect("c1").await, Command::Answer);
    switch.event("c1", "CHANNEL_ANSWER");
    task.await.unwrap();

    assert!(log.lock().unwrap().is_empty());
    let session = switch.service.session(&SessionId::from("c1")).unwrap();
    assert_eq!(session.status(), CallStatus::Answered);
    switch.assert_idle();
}

#[tokio::test]
async fn test_bridge_uses_capture_group() {
    let mut router = Router::new("outbound");
    router
        .route(r"^9(\d+)$")
        .name("dial_out")
        .to_fn(|sess, _r, m| async move {
            let number = m.group(1).unwrap_or_default().to_string();
            sess.answer().await?;
            sess.bridge_to(Some(format!("sofia/gateway/pstn/{}", number)))?;
            Ok::<_, HandlerError>(Flow::Continue)
        })
        .unwrap();
    let mut composer = Composer::new();
    composer.load_app(router, "default");
    let mut switch = FakeSwitch::new(composer);

    let task = switch.call("c1", &[(DEST, "95551234")]);
    assert_eq!(switch.expect("c1").await, Command::Answer);
    switch.event("c1", "CHANNEL_ANSWER");
    assert_eq!(
        switch.expect("c1").await,
        Command::Bridge { destination: Some("sofia/gateway/pstn/5551234".into()) }
    );
    task.await.unwrap();

    switch.event("c1", "CHANNEL_BRIDGE");
    let session = switch.service.session(&SessionId::from("c1")).unwrap();
    assert_eq!(session.status(), CallStatus::Bridged);
}

#[tokio::test]
async fn test_unsubscribed_event_never_reaches_handler() {
    let mut router = Router::new("r");
    router
        .route(".*")
        .to_fn(|sess, _r, _m| async move {
            sess.recv("DTMF").await?;
            Ok::<_, HandlerError>(Flow::Continue)
        })
        .unwrap();
    let mut composer = Composer::new();
    composer.load_app(router, "default");
    let switch = FakeSwitch::new(composer);

    let task = switch.call("c1", &[(DEST, "1")]);
    switch.event("c1", "DTMF");
    switch.gone("c1");

    match task.await.unwrap() {
        ComposeOutcome::Handled { report, .. } => match report.halt {
            Halt::Failed { error, .. } => {
                assert!(matches!(error, HandlerError::Session(SessionError::Terminated(_))));
            }
            other => panic!("unexpected halt {:?}", other),
        },
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let guard: Guard = [("Caller-Direction", "inbound")].into_iter().collect();
    let mut router = Router::with_guard("r", guard);
    router
        .route("slow")
        .to_fn(|sess, _r, _m| async move {
            sess.answer().await?;
            Ok::<_, HandlerError>(Flow::Continue)
        })
        .unwrap();
    router
        .route("busy")
        .to_fn(|sess, _r, _m| async move {
            sess.respond(486)?;
            Ok::<_, HandlerError>(Flow::Continue)
        })
        .unwrap();
    let mut composer = Composer::new();
    composer.load_app(router, "default");
    let mut switch = FakeSwitch::new(composer);

    let slow = switch.call("a", &[("Caller-Direction", "inbound"), (DEST, "slow")]);
    let busy = switch.call("b", &[("Caller-Direction", "inbound"), (DEST, "busy")]);

    // b completes while a is still waiting for its answer confirmation
    busy.await.unwrap();
    let mut seen = HashSet::new();
    for _ in 0..2 {
        let out = switch.next().await;
        seen.insert((out.session_id.as_str().to_string(), out.command.name()));
    }
    assert!(seen.contains(&("a".to_string(), "answer")));
    assert!(seen.contains(&("b".to_string(), "respond")));
    assert!(!slow.is_finished());

    switch.event("a", "CHANNEL_ANSWER");
    slow.await.unwrap();
}
