//! A chat session: one transcript, one live agent.
//!
//! The session subscribes to the event bus the settings store publishes on.
//! Changes are picked up lazily: the next `send` (or an explicit
//! [`Session::rebuild_on_change`]) drains the notifications and rebuilds
//! once, however many settings were written in between. A failed rebuild
//! leaves the previous agent in place and stays pending: every later `send`
//! retries it until one succeeds.

use serde_json::Value;
use slothtop_config::{AgentSettings, SettingField, SettingsStore};
use slothtop_core::event::{DomainEvent, EventBus};
use slothtop_core::message::ConversationState;
use slothtop_core::tool::ToolRegistry;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};

use crate::assembler::AgentAssembler;
use crate::error::AgentError;
use crate::executor::{AgentInstance, InvocationResult};
use crate::memory::ConversationMemory;

/// Display name for the user's turns.
pub const USER_DISPLAY_NAME: &str = "You";

pub struct Session {
    store: Arc<SettingsStore>,
    assembler: AgentAssembler,
    tools: Arc<ToolRegistry>,
    settings: AgentSettings,
    conversation: ConversationState,
    agent: Option<AgentInstance>,
    changes: broadcast::Receiver<Arc<DomainEvent>>,
    build_error: Option<AgentError>,
    /// Settings changed since the live agent was built.
    stale: bool,
    last_result: Option<InvocationResult>,
}

impl Session {
    /// Load settings and build the first agent.
    ///
    /// Unreadable settings are fatal. An unreachable backend is not: the
    /// session starts without an agent and [`build_error`](Self::build_error)
    /// says why.
    pub async fn open(
        store: Arc<SettingsStore>,
        assembler: AgentAssembler,
        tools: Arc<ToolRegistry>,
        bus: &EventBus,
    ) -> Result<Self, AgentError> {
        let changes = bus.subscribe();
        let settings = store.load()?;
        let mut session = Self {
            store,
            assembler,
            tools,
            settings,
            conversation: ConversationState::new(),
            agent: None,
            changes,
            build_error: None,
            stale: false,
            last_result: None,
        };
        if let Err(e) = session.rebuild().await {
            warn!(error = %e, "Starting without an agent");
        }
        Ok(session)
    }

    /// Run one user message through the agent.
    pub async fn send(&mut self, text: &str) -> Result<InvocationResult, AgentError> {
        if let Err(e) = self.rebuild_on_change().await {
            warn!(error = %e, "Settings changed but rebuild failed; keeping previous agent until it succeeds");
        }
        if self.agent.is_none() {
            self.rebuild().await?;
        }
        let Some(agent) = self.agent.as_mut() else {
            return Err(AgentError::backend(self.assembler.provider().name(), "no agent available"));
        };

        // only answered turns enter the transcript, matching agent memory
        let result = agent.invoke(text).await?;
        self.conversation.push_user(USER_DISPLAY_NAME, text);
        self.conversation.push_assistant(agent.name(), &result.output);
        self.last_result = Some(result.clone());
        Ok(result)
    }

    /// Persist one setting and rebuild the agent from it.
    ///
    /// The value is on disk even if the rebuild then fails.
    pub async fn update_setting(
        &mut self,
        field: SettingField,
        value: impl Into<Value>,
    ) -> Result<AgentSettings, AgentError> {
        let settings = self.store.set(field, value)?;
        self.apply_change().await?;
        Ok(settings)
    }

    /// [`update_setting`](Self::update_setting) from user-typed text.
    pub async fn set_from_str(&mut self, field: &str, raw: &str) -> Result<AgentSettings, AgentError> {
        let settings = self.store.set_from_str(field, raw)?;
        self.apply_change().await?;
        Ok(settings)
    }

    async fn apply_change(&mut self) -> Result<(), AgentError> {
        if !self.rebuild_on_change().await? {
            // store not wired to this session's bus
            self.rebuild().await?;
        }
        Ok(())
    }

    pub async fn switch_model(&mut self, model: &str) -> Result<AgentSettings, AgentError> {
        self.update_setting(SettingField::Model, model).await
    }

    /// Rebuild if any setting changed since the last successful build.
    /// Returns whether a rebuild happened.
    pub async fn rebuild_on_change(&mut self) -> Result<bool, AgentError> {
        loop {
            match self.changes.try_recv() {
                Ok(event) => {
                    if matches!(event.as_ref(), DomainEvent::SettingsChanged { .. }) {
                        self.stale = true;
                    }
                }
                // missed notifications may have been settings changes
                Err(TryRecvError::Lagged(_)) => self.stale = true,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if !self.stale {
            return Ok(false);
        }
        self.rebuild().await?;
        Ok(true)
    }

    /// Whether a settings change is still waiting for a successful rebuild.
    pub fn rebuild_pending(&self) -> bool {
        self.stale
    }

    /// Retry building the agent with the current settings.
    pub async fn reconnect(&mut self) -> Result<(), AgentError> {
        self.rebuild().await
    }

    async fn rebuild(&mut self) -> Result<(), AgentError> {
        self.settings = self.store.load()?;
        let memory = ConversationMemory::seeded(&self.conversation, self.assembler.policy().memory_window);
        match self
            .assembler
            .build(&self.settings, Arc::clone(&self.tools), memory)
            .await
        {
            Ok(agent) => {
                info!(model = %agent.model(), "Agent rebuilt");
                self.agent = Some(agent);
                self.build_error = None;
                self.stale = false;
                Ok(())
            }
            Err(e) => {
                self.build_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Settings as last loaded from disk.
    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn agent(&self) -> Option<&AgentInstance> {
        self.agent.as_ref()
    }

    pub fn has_agent(&self) -> bool {
        self.agent.is_some()
    }

    /// Why the most recent build failed, if it did.
    pub fn build_error(&self) -> Option<&AgentError> {
        self.build_error.as_ref()
    }

    pub fn last_result(&self) -> Option<&InvocationResult> {
        self.last_result.as_ref()
    }

    pub fn backend_name(&self) -> &str {
        self.assembler.provider().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionPolicy;
    use crate::test_helpers::*;
    use slothtop_core::error::ProviderError;
    use slothtop_core::message::Speaker;
    use slothtop_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Echoes like `EchoProvider`, but can be taken offline.
    #[derive(Default)]
    struct FlakyProvider {
        down: AtomicBool,
        health_checks: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Provider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ProviderError::Network("connection refused".into()));
            }
            EchoProvider.complete(request).await
        }
        async fn health_check(&self) -> Result<bool, ProviderError> {
            self.health_checks.fetch_add(1, Ordering::SeqCst);
            Ok(!self.down.load(Ordering::SeqCst))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        bus: EventBus,
        store: Arc<SettingsStore>,
        provider: Arc<FlakyProvider>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new(64);
        let store = SettingsStore::init(dir.path().join("settings.json"))
            .unwrap()
            .with_events(bus.clone());
        Fixture {
            _dir: dir,
            bus,
            store: Arc::new(store),
            provider: Arc::new(FlakyProvider::default()),
        }
    }

    async fn open(f: &Fixture) -> Session {
        let assembler = AgentAssembler::new(f.provider.clone(), ExecutionPolicy::default()).with_events(f.bus.clone());
        Session::open(Arc::clone(&f.store), assembler, Arc::new(ToolRegistry::new()), &f.bus)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn send_records_both_turns() {
        let f = fixture();
        let mut session = open(&f).await;
        let result = session.send("hello").await.unwrap();
        assert!(result.output.ends_with(":: hello"));

        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, Speaker::User);
        assert_eq!(turns[0].name, USER_DISPLAY_NAME);
        assert_eq!(turns[1].name, "Slothtop");
        assert_eq!(session.last_result(), Some(&result));
    }

    #[tokio::test]
    async fn setting_change_reaches_the_next_request() {
        let f = fixture();
        let mut session = open(&f).await;
        session.update_setting(SettingField::Temperature, 0.3).await.unwrap();
        let result = session.send("hi").await.unwrap();
        assert!(result.output.contains("t=0.3"), "{}", result.output);
        assert_eq!(f.store.load().unwrap().temperature, 0.3);
    }

    #[tokio::test]
    async fn many_changes_one_rebuild() {
        let f = fixture();
        let mut session = open(&f).await;
        let checks_after_open = f.provider.health_checks.load(Ordering::SeqCst);

        f.store.set(SettingField::TopK, 10).unwrap();
        f.store.set(SettingField::TopK, 20).unwrap();
        f.store.set(SettingField::Name, "Sloth").unwrap();

        assert!(session.rebuild_on_change().await.unwrap());
        assert!(!session.rebuild_on_change().await.unwrap());
        assert_eq!(f.provider.health_checks.load(Ordering::SeqCst), checks_after_open + 1);
        assert_eq!(session.agent().unwrap().name(), "Sloth");
        assert_eq!(session.agent().unwrap().sampling().top_k, 20);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_agent() {
        let f = fixture();
        let mut session = open(&f).await;
        f.provider.down.store(true, Ordering::SeqCst);

        let err = session.switch_model("qwen2.5:7b").await.unwrap_err();
        assert!(matches!(err, AgentError::BackendUnavailable { .. }));
        assert_eq!(f.store.load().unwrap().model, "qwen2.5:7b");
        assert_eq!(session.agent().unwrap().model(), "llama3.2");
        assert!(session.build_error().is_some());
    }

    #[tokio::test]
    async fn failed_switch_is_retried_on_next_send() {
        let f = fixture();
        let mut session = open(&f).await;
        f.provider.down.store(true, Ordering::SeqCst);
        assert!(session.switch_model("qwen2.5:7b").await.is_err());
        assert!(session.rebuild_pending());

        f.provider.down.store(false, Ordering::SeqCst);
        let first = session.send("hi").await.unwrap();
        let second = session.send("again").await.unwrap();
        assert!(first.output.starts_with("[qwen2.5:7b "), "{}", first.output);
        assert!(second.output.starts_with("[qwen2.5:7b "), "{}", second.output);
        assert_eq!(session.agent().unwrap().model(), "qwen2.5:7b");
        assert!(!session.rebuild_pending());
        assert!(session.build_error().is_none());
    }

    #[tokio::test]
    async fn failed_send_leaves_no_half_turn() {
        let f = fixture();
        let mut session = open(&f).await;
        f.provider.down.store(true, Ordering::SeqCst);
        assert!(session.send("lost").await.is_err());
        assert!(session.conversation().is_empty());

        f.provider.down.store(false, Ordering::SeqCst);
        session.send("hello").await.unwrap();
        let turns = session.conversation().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "hello");
        assert_eq!(session.agent().unwrap().memory().len(), turns.len());
    }

    #[tokio::test]
    async fn starts_without_backend_and_reconnects() {
        let f = fixture();
        f.provider.down.store(true, Ordering::SeqCst);
        let mut session = open(&f).await;
        assert!(!session.has_agent());
        assert!(session.send("hi").await.is_err());

        f.provider.down.store(false, Ordering::SeqCst);
        session.reconnect().await.unwrap();
        assert!(session.has_agent());
        assert!(session.build_error().is_none());
        assert!(session.send("hi").await.is_ok());
    }

    #[tokio::test]
    async fn rejected_value_changes_nothing() {
        let f = fixture();
        let mut session = open(&f).await;
        let err = session.set_from_str("temperature", "1.5").await.unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
        assert_eq!(session.settings().temperature, 0.7);
        assert!(!session.rebuild_on_change().await.unwrap());
    }

    #[tokio::test]
    async fn rebuilt_agent_remembers_the_conversation() {
        let f = fixture();
        let mut session = open(&f).await;
        session.send("first").await.unwrap();
        session.update_setting(SettingField::TopP, 0.5).await.unwrap();
        assert_eq!(session.agent().unwrap().memory().len(), 2);
    }
}
