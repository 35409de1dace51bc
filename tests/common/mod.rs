//! Shared utilities for integration tests.
//!
//! `FakeSwitch` plays the connection layer: it owns the command stream a
//! `ChannelControl` produces and feeds events back into the service.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use call_router::session::{Command, Metadata, Outbound};
use call_router::{ChannelControl, Composer, InboundEvent, Service, SessionId};
use tokio::sync::mpsc;

pub const DEST: &str = "Caller-Destination-Number";

pub struct FakeSwitch {
    pub service: Arc<Service>,
    commands: mpsc::UnboundedReceiver<Outbound>,
}

impl FakeSwitch {
    pub fn new(composer: Composer) -> Self {
        let (control, commands) = ChannelControl::new();
        Self {
            service: Arc::new(Service::new(composer, Arc::new(control), 16)),
            commands,
        }
    }

    /// Hand a new call to the service and return its dispatch task.
    pub fn call(
        &self,
        id: &str,
        headers: &[(&str, &str)],
    ) -> tokio::task::JoinHandle<call_router::routing::ComposeOutcome> {
        self.service
            .handle(InboundEvent::NewSession {
                session_id: SessionId::from(id),
                host: "fs1".into(),
                headers: metadata(headers),
            })
            .expect("session id already live")
    }

    pub fn event(&self, id: &str, name: &str) {
        self.service.handle(InboundEvent::Event {
            session_id: SessionId::from(id),
            name: name.to_string(),
            headers: Default::default(),
        });
    }

    pub fn gone(&self, id: &str) {
        self.service.handle(InboundEvent::Gone {
            session_id: SessionId::from(id),
        });
    }

    /// Next command sent by any session.
    pub async fn next(&mut self) -> Outbound {
        tokio::time::timeout(Duration::from_secs(1), self.commands.recv())
            .await
            .expect("timed out waiting for command")
            .expect("command channel closed")
    }

    /// Next command, which must belong to `id`.
    pub async fn expect(&mut self, id: &str) -> Command {
        let outbound = self.next().await;
        assert_eq!(outbound.session_id.as_str(), id);
        outbound.command
    }

    pub fn assert_idle(&mut self) {
        if let Ok(outbound) = self.commands.try_recv() {
            panic!("unexpected command {:?}", outbound);
        }
    }
}

pub fn metadata(pairs: &[(&str, &str)]) -> Metadata {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}
