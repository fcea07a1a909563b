//! 轮次管线集成测试：检索 → 增强 → 历史 → Agent 流 → 过滤展示 → 重置

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use ragent::agent::TOOL_DISABLED_RESULT;
    use ragent::index::{
        sample_documents, Document, DocumentIndex, IndexSchema, InMemoryIndex, SearchHit,
    };
    use ragent::llm::{BackendEvent, EchoChatBackend, ScriptedChatBackend, ScriptedRound};
    use ragent::memory::{Message, Role};
    use ragent::rag::{augment, Retriever, NO_CONTEXT};
    use ragent::tools::{FunctionChoicePolicy, AUGMENT_TOOL_NAME};
    use ragent::ui::BufferSink;
    use ragent::{AgentBuilder, AppConfig, RagError, TurnOrchestrator, TurnState};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    const SCENARIO_A: &str = "Can you explain Contoso's travel insurance coverage?";
    const SCENARIO_B: &str = "What is Neural Network?";

    struct FailingIndex;

    #[async_trait]
    impl DocumentIndex for FailingIndex {
        async fn create_index(&self, _schema: &IndexSchema) -> Result<(), String> {
            Ok(())
        }

        async fn upload(&self, documents: &[Document]) -> Result<usize, String> {
            Ok(documents.len())
        }

        async fn search(&self, _query: &str, _top: usize) -> Result<Vec<SearchHit>, String> {
            Err("service unavailable".to_string())
        }
    }

    struct SlowIndex(Duration);

    #[async_trait]
    impl DocumentIndex for SlowIndex {
        async fn create_index(&self, _schema: &IndexSchema) -> Result<(), String> {
            Ok(())
        }

        async fn upload(&self, documents: &[Document]) -> Result<usize, String> {
            Ok(documents.len())
        }

        async fn search(&self, _query: &str, _top: usize) -> Result<Vec<SearchHit>, String> {
            tokio::time::sleep(self.0).await;
            Ok(Vec::new())
        }
    }

    fn config(policy: FunctionChoicePolicy) -> AppConfig {
        let mut config = AppConfig::default();
        config.search.seed_samples = false;
        config.agent.function_choice = policy;
        config
    }

    fn contoso_index() -> Arc<InMemoryIndex> {
        Arc::new(InMemoryIndex::with_documents(sample_documents()))
    }

    async fn build(
        config: AppConfig,
        index: Arc<dyn DocumentIndex>,
        backend: Arc<dyn ragent::llm::ChatBackend>,
    ) -> TurnOrchestrator {
        AgentBuilder::new(config)
            .with_index(index)
            .with_backend(backend)
            .build()
            .await
            .unwrap()
    }

    async fn build_with(
        policy: FunctionChoicePolicy,
        backend: Arc<ScriptedChatBackend>,
    ) -> TurnOrchestrator {
        build(config(policy), contoso_index(), backend).await
    }

    async fn slow_retrieval_orchestrator() -> (TurnOrchestrator, Arc<ScriptedChatBackend>) {
        let backend = Arc::new(ScriptedChatBackend::new(vec![ScriptedRound::text(&["unused"])]));
        let mut cfg = config(FunctionChoicePolicy::Auto);
        cfg.timeouts.retrieval_secs = 1;
        let index = Arc::new(SlowIndex(Duration::from_secs(3)));
        (build(cfg, index, backend.clone()).await, backend)
    }

    #[tokio::test]
    async fn test_scenario_grounded_answer() {
        let index = contoso_index();
        let context = Retriever::new(index.clone(), 3).retrieve(SCENARIO_A).await.unwrap();
        assert!(context.contains(
            "Contoso's travel insurance covers medical emergencies, trip cancellations, and lost baggage."
        ));

        let backend = Arc::new(ScriptedChatBackend::new(vec![ScriptedRound::text(&[
            "Contoso's travel insurance ",
            "covers medical emergencies, ",
            "trip cancellations, and lost baggage.",
        ])]));
        let mut orch = build(config(FunctionChoicePolicy::Auto), index, backend.clone()).await;
        let mut sink = BufferSink::new();
        let outcome = orch
            .run_turn(SCENARIO_A, &mut sink, CancellationToken::new())
            .await
            .unwrap();

        let expected = "Contoso's travel insurance covers medical emergencies, trip cancellations, and lost baggage.";
        assert_eq!(outcome.response, expected);
        assert_eq!(sink.collected(), expected);
        assert!(outcome.response.contains("covers"));
        assert_eq!(sink.author.as_deref(), Some("Assistant"));
        assert_eq!((sink.begins, sink.ends), (1, 1));

        // 发给 Agent 的历史恰好是 [system: 增强提示, user: 原始问题]
        let requests = backend.requests();
        assert_eq!(
            requests[0].messages,
            vec![Message::system(augment(SCENARIO_A, &context)), Message::user(SCENARIO_A)]
        );
        assert_eq!(orch.state(), TurnState::Done);
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_no_matching_document() {
        let mut orch = build(
            config(FunctionChoicePolicy::Auto),
            contoso_index(),
            Arc::new(EchoChatBackend::new()),
        )
        .await;
        let mut sink = BufferSink::new();
        let outcome = orch
            .run_turn(SCENARIO_B, &mut sink, CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.response.is_empty());
        assert!(!outcome.response.contains("Document:"));
        assert!(!outcome.response.contains("Contoso"));
        assert!(outcome.response.contains("could not find"));
    }

    #[tokio::test]
    async fn test_no_context_sentinel_reaches_prompt() {
        let backend = Arc::new(ScriptedChatBackend::new(vec![ScriptedRound::text(&["n/a"])]));
        let mut orch = build_with(FunctionChoicePolicy::Auto, backend.clone()).await;
        orch.run_turn(SCENARIO_B, &mut BufferSink::new(), CancellationToken::new())
            .await
            .unwrap();
        let system = &backend.requests()[0].messages[0];
        assert_eq!(system.role, Role::System);
        assert_eq!(system.content, augment(SCENARIO_B, NO_CONTEXT));
    }

    #[tokio::test]
    async fn test_tool_markers_filtered_and_text_once() {
        let context = "Document: Contoso's travel insurance covers lost baggage.";
        let backend = Arc::new(ScriptedChatBackend::new(vec![
            ScriptedRound::Stream(vec![
                Ok(BackendEvent::Text("Let me check. ".into())),
                Ok(BackendEvent::ToolCalls(vec![ragent::memory::ToolCallRequest {
                    id: "call_1".into(),
                    name: AUGMENT_TOOL_NAME.into(),
                    arguments: json!({"query": SCENARIO_A, "context": context}).to_string(),
                }])),
            ]),
            ScriptedRound::text(&["It covers ", "lost baggage."]),
        ]));
        let mut orch = build_with(FunctionChoicePolicy::Required, backend.clone()).await;
        let mut sink = BufferSink::new();
        let outcome = orch
            .run_turn(SCENARIO_A, &mut sink, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sink.chunks, vec!["Let me check. ", "It covers ", "lost baggage."]);
        assert_eq!(outcome.response, "Let me check. It covers lost baggage.");
        assert_eq!(outcome.tool_events, 2);

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tool_choice, Some("required"));
        assert_eq!(requests[1].tool_choice, Some("auto"));
        // 工具路径与直接调用产出一致
        let tool_message = requests[1]
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(tool_message.content, augment(SCENARIO_A, context));
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_policy_none_sends_no_tools() {
        let backend = Arc::new(ScriptedChatBackend::new(vec![
            ScriptedRound::tool_call(
                "call_1",
                AUGMENT_TOOL_NAME,
                json!({"query": "q", "context": "c"}),
            ),
            ScriptedRound::text(&["plain answer"]),
        ]));
        let mut orch = build_with(FunctionChoicePolicy::None, backend.clone()).await;
        let outcome = orch
            .run_turn(SCENARIO_A, &mut BufferSink::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.response, "plain answer");
        let requests = backend.requests();
        assert!(requests.iter().all(|r| r.tools.is_empty() && r.tool_choice.is_none()));
        let refused = requests[1]
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(refused.content, TOOL_DISABLED_RESULT);
    }

    #[tokio::test]
    async fn test_turns_are_isolated() {
        let backend = Arc::new(ScriptedChatBackend::new(vec![
            ScriptedRound::text(&["one"]),
            ScriptedRound::text(&["two"]),
        ]));
        let mut orch = build_with(FunctionChoicePolicy::Auto, backend.clone()).await;
        for query in ["first question", "second question"] {
            orch.run_turn(query, &mut BufferSink::new(), CancellationToken::new())
                .await
                .unwrap();
        }
        let requests = backend.requests();
        assert_eq!(requests[1].messages.len(), 2);
        assert_eq!(requests[1].messages[1].content, "second question");
    }

    #[tokio::test]
    async fn test_retrieval_failure_aborts_turn() {
        let backend = Arc::new(ScriptedChatBackend::new(vec![ScriptedRound::text(&["unused"])]));
        let index = Arc::new(FailingIndex);
        let mut orch = build(config(FunctionChoicePolicy::Auto), index, backend.clone()).await;
        let mut sink = BufferSink::new();
        let err = orch
            .run_turn(SCENARIO_A, &mut sink, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Retrieval(msg) if msg.contains("service unavailable")));
        assert!(backend.requests().is_empty());
        assert_eq!(sink.begins, 0);
        assert_eq!(orch.state(), TurnState::Idle);
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_timeout_aborts_turn() {
        let (mut orch, backend) = slow_retrieval_orchestrator().await;
        let mut sink = BufferSink::new();
        let err = orch
            .run_turn(SCENARIO_A, &mut sink, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Timeout { stage: "retrieval", secs: 1 }));
        assert!(backend.requests().is_empty());
        assert_eq!(sink.begins, 0);
        assert_eq!(orch.state(), TurnState::Idle);
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_during_retrieval() {
        let (mut orch, backend) = slow_retrieval_orchestrator().await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });
        let err = orch
            .run_turn(SCENARIO_A, &mut BufferSink::new(), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
        assert!(backend.requests().is_empty());
        assert_eq!(orch.state(), TurnState::Idle);
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_displayed_text() {
        let backend = Arc::new(ScriptedChatBackend::new(vec![ScriptedRound::Stream(vec![
            Ok(BackendEvent::Text("Partial ".into())),
            Err("stream closed before completion".into()),
        ])]));
        let mut orch = build(config(FunctionChoicePolicy::Auto), contoso_index(), backend).await;
        let mut sink = BufferSink::new();
        let err = orch
            .run_turn(SCENARIO_A, &mut sink, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
        assert_eq!(sink.collected(), "Partial ");
        assert_eq!(sink.ends, 1);
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_stream_idle_timeout() {
        let backend = Arc::new(
            ScriptedChatBackend::new(vec![ScriptedRound::text(&["slow"])])
                .with_delay(Duration::from_secs(3)),
        );
        let mut cfg = config(FunctionChoicePolicy::Auto);
        cfg.timeouts.stream_idle_secs = 1;
        let mut orch = build(cfg, contoso_index(), backend).await;
        let err = orch
            .run_turn(SCENARIO_A, &mut BufferSink::new(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Timeout { stage: "stream", secs: 1 }));
        assert_eq!(orch.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_cancellation_mid_stream() {
        let backend = Arc::new(
            ScriptedChatBackend::new(vec![ScriptedRound::text(&["a", "b", "c", "d"])])
                .with_delay(Duration::from_millis(200)),
        );
        let mut orch = build(config(FunctionChoicePolicy::Auto), contoso_index(), backend).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });
        let mut sink = BufferSink::new();
        let err = orch.run_turn(SCENARIO_A, &mut sink, cancel).await.unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
        assert!(sink.chunks.len() < 4);
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn test_offline_required_policy_runs_tool_path() {
        let mut cfg = AppConfig::default();
        cfg.agent.function_choice = FunctionChoicePolicy::Required;
        let mut orch = AgentBuilder::new(cfg)
            .with_backend(Arc::new(EchoChatBackend::new()))
            .build()
            .await
            .unwrap();
        let outcome = orch
            .run_turn(SCENARIO_A, &mut BufferSink::new(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.tool_events, 2);
        assert!(outcome.response.starts_with("According to the retrieved documents:"));
    }
}
