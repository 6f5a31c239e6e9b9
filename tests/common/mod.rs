//! Shared test utilities for snmp-session integration tests.

// Not all test files use all utilities
#![allow(dead_code)]
#![allow(unused_imports)]

use std::time::Duration;

use snmp_session::Session;

mod agent;
mod codec;
mod fixtures;

pub use agent::{AgentOptions, FakeAgent};
pub use codec::LoopbackCodec;
pub use fixtures::*;

/// Install a tracing subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Agent serving [`standard_mib`] plus a codec shared with it.
pub fn standard_agent() -> (LoopbackCodec, FakeAgent) {
    agent_with(AgentOptions {
        mib: standard_mib(),
        ..AgentOptions::default()
    })
}

pub fn agent_with(options: AgentOptions) -> (LoopbackCodec, FakeAgent) {
    let codec = LoopbackCodec::default();
    let agent = FakeAgent::start(codec.clone(), options);
    (codec, agent)
}

/// v2c session whose requests and notifications both go to `agent`.
pub async fn v2c_session(codec: &LoopbackCodec, agent: &FakeAgent) -> Session {
    Session::v2c("127.0.0.1")
        .community(COMMUNITY)
        .port(agent.port())
        .trap_port(agent.port())
        .timeout(Duration::from_millis(200))
        .codec(codec.clone())
        .connect()
        .await
        .unwrap()
}

pub async fn v1_session(codec: &LoopbackCodec, agent: &FakeAgent) -> Session {
    Session::v1("127.0.0.1")
        .community(COMMUNITY)
        .port(agent.port())
        .trap_port(agent.port())
        .timeout(Duration::from_millis(200))
        .codec(codec.clone())
        .connect()
        .await
        .unwrap()
}
