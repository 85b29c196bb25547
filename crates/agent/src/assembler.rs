//! Building agent instances from settings.
//!
//! The assembler owns the model client; every instance it builds shares
//! that client, so rebuilding after each settings change never opens a new
//! connection pool. Building checks the backend is reachable and has the
//! requested model before anything is replaced.

use slothtop_config::AgentSettings;
use slothtop_core::event::{DomainEvent, EventBus};
use slothtop_core::provider::{Provider, model_matches};
use slothtop_core::tool::ToolRegistry;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::executor::{AgentInstance, ExecutionPolicy};
use crate::memory::ConversationMemory;
use crate::prompt::PromptTemplate;

pub struct AgentAssembler {
    provider: Arc<dyn Provider>,
    policy: ExecutionPolicy,
    events: Option<EventBus>,
}

impl AgentAssembler {
    pub fn new(provider: Arc<dyn Provider>, policy: ExecutionPolicy) -> Self {
        Self {
            provider,
            policy,
            events: None,
        }
    }

    /// Publish `AgentRebuilt` and tool events on `bus`.
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Check the backend can serve `model`.
    pub async fn check_backend(&self, model: &str) -> Result<(), AgentError> {
        let backend = self.provider.name();
        match self.provider.health_check().await {
            Ok(true) => {}
            Ok(false) => return Err(AgentError::backend(backend, "not reachable")),
            Err(e) => return Err(AgentError::backend(backend, e)),
        }

        let models = self
            .provider
            .list_models()
            .await
            .map_err(|e| AgentError::backend(backend, e))?;
        // an empty list means the backend does not advertise its models
        if !models.is_empty() && !model_matches(&models, model) {
            return Err(AgentError::backend(
                backend,
                format!("model '{model}' is not available (installed: {})", models.join(", ")),
            ));
        }
        Ok(())
    }

    /// Bind prompt, tools, model client and policy into a new instance.
    pub async fn build(
        &self,
        settings: &AgentSettings,
        tools: Arc<ToolRegistry>,
        memory: ConversationMemory,
    ) -> Result<AgentInstance, AgentError> {
        if let Err(e) = self.check_backend(&settings.model).await {
            warn!(model = %settings.model, error = %e, "Agent build failed");
            return Err(e);
        }

        let definitions = tools.definitions();
        debug!(tools = definitions.len(), memory = memory.len(), "Assembling agent");

        let instance = AgentInstance {
            provider: Arc::clone(&self.provider),
            name: settings.name.clone(),
            model: settings.model.clone(),
            sampling: settings.sampling(),
            prompt: PromptTemplate::new(&settings.prompt),
            tools,
            definitions,
            policy: self.policy.clone(),
            memory,
            events: self.events.clone(),
        };

        info!(
            backend = self.provider.name(),
            model = %instance.model,
            tools = instance.definitions.len(),
            "Agent ready"
        );
        if let Some(bus) = &self.events {
            bus.publish(DomainEvent::AgentRebuilt {
                model: instance.model.clone(),
                tool_count: instance.definitions.len(),
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use slothtop_core::error::ProviderError;
    use slothtop_core::provider::{ProviderRequest, ProviderResponse};

    struct ListingProvider(Vec<String>);

    #[async_trait::async_trait]
    impl Provider for ListingProvider {
        fn name(&self) -> &str {
            "ollama"
        }
        async fn complete(&self, _r: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(make_text_response("ok"))
        }
        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    fn settings() -> AgentSettings {
        AgentSettings {
            model: "llama3.2".into(),
            ..AgentSettings::default()
        }
    }

    #[tokio::test]
    async fn build_binds_settings() {
        let assembler = AgentAssembler::new(Arc::new(EchoProvider), ExecutionPolicy::default());
        let mut s = settings();
        s.temperature = 0.2;
        s.name = "Sloth".into();
        let instance = assembler
            .build(&s, Arc::new(ToolRegistry::new()), ConversationMemory::new(4))
            .await
            .unwrap();
        assert_eq!(instance.name(), "Sloth");
        assert_eq!(instance.model(), "llama3.2");
        assert_eq!(instance.sampling().temperature, 0.2);
    }

    #[tokio::test]
    async fn identical_builds_behave_identically() {
        let assembler = AgentAssembler::new(Arc::new(EchoProvider), ExecutionPolicy::default());
        let tools = Arc::new(ToolRegistry::new());
        let mut a = assembler
            .build(&settings(), Arc::clone(&tools), ConversationMemory::new(4))
            .await
            .unwrap();
        let mut b = assembler
            .build(&settings(), Arc::clone(&tools), ConversationMemory::new(4))
            .await
            .unwrap();
        let ra = a.invoke("open notepad").await.unwrap();
        let rb = b.invoke("open notepad").await.unwrap();
        assert_eq!(ra, rb);
    }

    #[tokio::test]
    async fn unreachable_backend_fails_build() {
        let assembler = AgentAssembler::new(Arc::new(FailingProvider), ExecutionPolicy::default());
        let err = assembler
            .build(&settings(), Arc::new(ToolRegistry::new()), ConversationMemory::new(4))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::BackendUnavailable { ref backend, .. } if backend == "down"));
    }

    #[tokio::test]
    async fn missing_model_fails_build() {
        let provider = ListingProvider(vec!["mistral-nemo:latest".into()]);
        let assembler = AgentAssembler::new(Arc::new(provider), ExecutionPolicy::default());
        let err = assembler
            .build(&settings(), Arc::new(ToolRegistry::new()), ConversationMemory::new(4))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("llama3.2"));
    }

    #[tokio::test]
    async fn latest_tag_is_implied() {
        let provider = ListingProvider(vec!["llama3.2:latest".into()]);
        let assembler = AgentAssembler::new(Arc::new(provider), ExecutionPolicy::default());
        assert!(assembler.check_backend("llama3.2").await.is_ok());
    }

    #[tokio::test]
    async fn builds_share_one_client() {
        let provider: Arc<dyn Provider> = Arc::new(EchoProvider);
        let assembler = AgentAssembler::new(Arc::clone(&provider), ExecutionPolicy::default());
        let tools = Arc::new(ToolRegistry::new());

        let mut current = None;
        for _ in 0..5 {
            current = Some(
                assembler
                    .build(&settings(), Arc::clone(&tools), ConversationMemory::new(4))
                    .await
                    .unwrap(),
            );
        }
        assert!(current.is_some());
        // test handle + assembler + the one live instance
        assert_eq!(Arc::strong_count(&provider), 3);
    }

    #[tokio::test]
    async fn rebuild_event_published() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let assembler =
            AgentAssembler::new(Arc::new(EchoProvider), ExecutionPolicy::default()).with_events(bus);
        assembler
            .build(&settings(), Arc::new(ToolRegistry::new()), ConversationMemory::new(4))
            .await
            .unwrap();
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.as_ref(), DomainEvent::AgentRebuilt { tool_count: 0, .. }));
    }
}
