use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};

use chatgate_core::{ChatGateway, GatewayError};
use chatgate_protocol::chat::{ChatRequest, ConversationTurn, StreamEvent, StreamEventKind};
use chatgate_provider_core::{
    ChatProvider, CompletionRequest, FragmentStream, ModelRegistry, PromptMessage, ProviderError,
    ProviderFamily, ProviderResult, ProviderSet, Role,
};
use chatgate_storage::{DEFAULT_GENERATIONS, HistoryStore, NewEntry, QuotaLedger, SeaOrmStore};

enum Script {
    Reply(Vec<&'static str>),
    FailAfter(Vec<&'static str>),
    RefuseToOpen,
    Hang(Vec<&'static str>),
}

struct ScriptedProvider {
    script: Script,
    title: &'static str,
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::OpenAI
    }

    async fn stream(&self, _request: CompletionRequest) -> ProviderResult<FragmentStream> {
        let ok = |items: &[&'static str]| {
            items
                .iter()
                .map(|item| Ok(item.to_string()))
                .collect::<Vec<ProviderResult<String>>>()
        };
        Ok(match &self.script {
            Script::Reply(items) => stream::iter(ok(items)).boxed(),
            Script::FailAfter(items) => {
                let mut items = ok(items);
                items.push(Err(ProviderError::ErrorEvent("overloaded".to_string())));
                stream::iter(items).boxed()
            }
            Script::RefuseToOpen => return Err(ProviderError::RateLimited),
            Script::Hang(items) => stream::iter(ok(items)).chain(stream::pending()).boxed(),
        })
    }

    async fn complete(&self, _request: CompletionRequest) -> ProviderResult<String> {
        Ok(self.title.to_string())
    }

    fn count_tokens(&self, text: &str, _model: &str) -> i64 {
        text.split_whitespace().count() as i64
    }
}

/// Replies with fixed fragments and remembers what it was asked and where
/// tokens were counted.
#[derive(Default)]
struct RecordingProvider {
    completions: Mutex<Vec<CompletionRequest>>,
    counting_threads: Mutex<Vec<ThreadId>>,
    count_delay: Duration,
}

#[async_trait]
impl ChatProvider for RecordingProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::OpenAI
    }

    async fn stream(&self, _request: CompletionRequest) -> ProviderResult<FragmentStream> {
        Ok(stream::iter(vec![Ok("recorded".to_string()), Ok(" reply".to_string())]).boxed())
    }

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<String> {
        self.completions.lock().unwrap().push(request);
        Ok("Recorded title".to_string())
    }

    fn count_tokens(&self, text: &str, _model: &str) -> i64 {
        self.counting_threads.lock().unwrap().push(std::thread::current().id());
        std::thread::sleep(self.count_delay);
        text.split_whitespace().count() as i64
    }
}

async fn setup(script: Script) -> (ChatGateway, Arc<SeaOrmStore>) {
    setup_with(Arc::new(ScriptedProvider {
        script,
        title: "\"Rust/async streaming basics\"",
    }))
    .await
}

async fn setup_with(provider: Arc<dyn ChatProvider>) -> (ChatGateway, Arc<SeaOrmStore>) {
    let store = SeaOrmStore::connect("sqlite::memory:").await.unwrap();
    store.sync().await.unwrap();
    let store = Arc::new(store);
    let gateway = ChatGateway::new(
        Arc::new(ModelRegistry::builtin()),
        ProviderSet::uniform(provider),
        store.clone(),
        store.clone(),
    );
    (gateway, store)
}

fn request(input: &str) -> ChatRequest {
    ChatRequest {
        user_input: input.to_string(),
        history: Vec::new(),
        model: "gpt-4o-mini".to_string(),
        temperature: 0.8,
        exchange_id: None,
        regenerate: false,
    }
}

async fn collect(gateway: &ChatGateway, user: &str, req: ChatRequest) -> Vec<StreamEvent> {
    gateway.open_stream(user, req).await.unwrap().collect().await
}

async fn wait_for_balance(store: &SeaOrmStore, user: &str, expected: i64) {
    for _ in 0..100 {
        if store.remaining(user).await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("balance for {user} never reached {expected}");
}

#[tokio::test]
async fn completed_stream_charges_once_and_persists() {
    let (gateway, store) = setup(Script::Reply(vec!["Hello", " there", " friend"])).await;

    let events = collect(&gateway, "alice", request("say hi")).await;
    assert_eq!(events.len(), 4);
    assert_eq!(events[0], StreamEvent::fragment("Hello"));
    let last = events.last().unwrap();
    assert!(last.is_final);
    assert_eq!(last.event, StreamEventKind::Stream);
    let exchange_id = last.exchange_id.clone().unwrap();

    assert_eq!(store.remaining("alice").await.unwrap(), DEFAULT_GENERATIONS - 1);
    let entries = gateway.exchange("alice", &exchange_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].ai_message, "Hello there friend");
    assert_eq!(entries[0].user_message, "say hi");
    assert_eq!(entries[0].stats.output_token_length, 3);
    // "Human: say hi"
    assert_eq!(entries[0].stats.input_token_length, 3);
    assert!(entries[0].stats.cost > 0.0);

    let history = gateway.history("alice", 1, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].chat_id, exchange_id);
}

#[tokio::test]
async fn follow_up_appends_to_the_same_exchange() {
    let (gateway, _store) = setup(Script::Reply(vec!["ok"])).await;
    let first = collect(&gateway, "alice", request("one")).await;
    let exchange_id = first.last().unwrap().exchange_id.clone().unwrap();

    let mut follow_up = request("two");
    follow_up.exchange_id = Some(exchange_id.clone());
    follow_up.regenerate = true;
    follow_up.history = vec![ConversationTurn {
        user_message: "one".to_string(),
        ai_message: "ok".to_string(),
    }];
    let second = collect(&gateway, "alice", follow_up).await;
    assert_eq!(second.last().unwrap().exchange_id.as_deref(), Some(exchange_id.as_str()));

    let entries = gateway.exchange("alice", &exchange_id).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[1].regenerate_message);
}

#[tokio::test]
async fn upstream_failure_refunds_and_ends_with_error_event() {
    let (gateway, store) = setup(Script::FailAfter(vec!["one", " two", " three"])).await;

    let events = collect(&gateway, "alice", request("hi")).await;
    assert_eq!(events.len(), 4);
    assert_eq!(
        &events[..3],
        &[
            StreamEvent::fragment("one"),
            StreamEvent::fragment(" two"),
            StreamEvent::fragment(" three"),
        ]
    );
    assert!(events[..3].iter().all(|event| !event.is_final));
    assert_eq!(events[3].event, StreamEventKind::Error);
    assert!(events[3].is_final);
    assert_eq!(events[3].exchange_id, None);

    assert_eq!(store.remaining("alice").await.unwrap(), DEFAULT_GENERATIONS);
    assert!(gateway.history("alice", 1, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn refused_upstream_emits_only_the_error_event() {
    let (gateway, store) = setup(Script::RefuseToOpen).await;
    let events = collect(&gateway, "alice", request("hi")).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, StreamEventKind::Error);
    assert_eq!(store.remaining("alice").await.unwrap(), DEFAULT_GENERATIONS);
}

#[tokio::test]
async fn rejections_happen_before_any_charge() {
    let (gateway, store) = setup(Script::Reply(vec!["ok"])).await;

    let mut unknown = request("hi");
    unknown.model = "gpt-9".to_string();
    assert!(matches!(
        gateway.open_stream("alice", unknown).await,
        Err(GatewayError::UnknownModel(_))
    ));

    let mut negative = request("hi");
    negative.temperature = -1.0;
    assert!(matches!(
        gateway.open_stream("alice", negative).await,
        Err(GatewayError::BadRequest(_))
    ));

    assert!(matches!(
        gateway.open_stream("alice", request("   ")).await,
        Err(GatewayError::BadRequest(_))
    ));

    assert_eq!(store.remaining("alice").await.unwrap(), DEFAULT_GENERATIONS);
}

#[tokio::test]
async fn exhausted_quota_is_rejected() {
    let (gateway, store) = setup(Script::Reply(vec!["ok"])).await;
    store.grant("alice", -DEFAULT_GENERATIONS).await.unwrap();

    assert!(matches!(
        gateway.open_stream("alice", request("hi")).await,
        Err(GatewayError::QuotaExceeded)
    ));
    assert_eq!(gateway.generations("alice").await.unwrap(), 0);
}

#[tokio::test]
async fn foreign_exchange_is_forbidden() {
    let (gateway, store) = setup(Script::Reply(vec!["ok"])).await;
    let exchange_id = store
        .record_exchange(
            None,
            "bob",
            NewEntry {
                user_message: "mine".to_string(),
                ai_message: "yours".to_string(),
                regenerate: false,
                model: "gpt-4o-mini".to_string(),
                input_tokens: 1,
                output_tokens: 1,
                cost_nanos: 1,
            },
        )
        .await
        .unwrap();

    let mut req = request("let me in");
    req.exchange_id = Some(exchange_id.clone());
    assert!(matches!(
        gateway.open_stream("alice", req).await,
        Err(GatewayError::Forbidden)
    ));
    assert!(matches!(
        gateway.exchange("alice", &exchange_id).await,
        Err(GatewayError::NotFound(_))
    ));
    assert_eq!(store.remaining("alice").await.unwrap(), DEFAULT_GENERATIONS);
}

#[tokio::test]
async fn client_disconnect_refunds_without_persisting() {
    let (gateway, store) = setup(Script::Hang(vec!["first"])).await;

    let mut events = gateway.open_stream("alice", request("hi")).await.unwrap();
    assert_eq!(events.next().await, Some(StreamEvent::fragment("first")));
    assert_eq!(store.remaining("alice").await.unwrap(), DEFAULT_GENERATIONS - 1);
    drop(events);

    wait_for_balance(&store, "alice", DEFAULT_GENERATIONS).await;
    assert!(gateway.history("alice", 1, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn last_generation_goes_to_exactly_one_request() {
    let (gateway, store) = setup(Script::Hang(vec!["x"])).await;
    store.grant("alice", 1 - DEFAULT_GENERATIONS).await.unwrap();

    let (a, b) = tokio::join!(
        gateway.open_stream("alice", request("a")),
        gateway.open_stream("alice", request("b")),
    );
    let accepted = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(accepted, 1);
    assert_eq!(store.remaining("alice").await.unwrap(), 0);

    let rejected = match (a, b) {
        (Ok(_), Err(err)) | (Err(err), Ok(_)) => err,
        _ => unreachable!(),
    };
    assert!(matches!(rejected, GatewayError::QuotaExceeded));
}

#[tokio::test]
async fn title_is_cleaned_and_free() {
    let (gateway, store) = setup(Script::Reply(vec!["ok"])).await;
    let events = collect(&gateway, "alice", request("explain async")).await;
    let exchange_id = events.last().unwrap().exchange_id.clone().unwrap();
    let before = store.remaining("alice").await.unwrap();

    let mut req = request("ignored");
    req.exchange_id = Some(exchange_id.clone());
    let title = gateway.generate_title("alice", req).await.unwrap();
    assert_eq!(title, "Rustasync streaming basics");
    assert_eq!(store.remaining("alice").await.unwrap(), before);

    let history = gateway.history("alice", 1, 10).await.unwrap();
    assert_eq!(history[0].chat_title.as_deref(), Some(title.as_str()));

    let mut missing = request("ignored");
    missing.exchange_id = Some("nope".to_string());
    assert!(matches!(
        gateway.generate_title("alice", missing).await,
        Err(GatewayError::NotFound("exchange"))
    ));
}

#[tokio::test]
async fn title_prompt_is_history_then_instruction_and_writes_no_entry() {
    let provider = Arc::new(RecordingProvider::default());
    let (gateway, _store) = setup_with(provider.clone()).await;
    let events = collect(&gateway, "alice", request("start")).await;
    let exchange_id = events.last().unwrap().exchange_id.clone().unwrap();
    let entries_before = gateway.exchange("alice", &exchange_id).await.unwrap().len();

    let mut req = request("ignored");
    req.exchange_id = Some(exchange_id.clone());
    req.history = (1..=4)
        .map(|n| ConversationTurn {
            user_message: format!("question {n}"),
            ai_message: format!("answer {n}"),
        })
        .collect();
    assert_eq!(gateway.generate_title("alice", req).await.unwrap(), "Recorded title");

    let completions = provider.completions.lock().unwrap().clone();
    assert_eq!(completions.len(), 1);
    let messages = &completions[0].messages;
    assert_eq!(messages.len(), 9);
    for n in 1..=4 {
        assert_eq!(messages[2 * n - 2], PromptMessage::user(format!("question {n}")));
        assert_eq!(messages[2 * n - 1], PromptMessage::assistant(format!("answer {n}")));
    }
    let instruction = &messages[8];
    assert_eq!(instruction.role, Role::User);
    assert!(instruction.content.contains("5-word title"));
    assert_eq!(completions[0].model, "gpt-4o-mini");

    let entries_after = gateway.exchange("alice", &exchange_id).await.unwrap().len();
    assert_eq!(entries_after, entries_before);
}

#[tokio::test]
async fn token_counting_runs_off_the_runtime_thread() {
    let provider = Arc::new(RecordingProvider::default());
    let (gateway, _store) = setup_with(provider.clone()).await;

    let events = collect(&gateway, "alice", request("count me")).await;
    assert!(events.last().unwrap().exchange_id.is_some());

    let runtime_thread = std::thread::current().id();
    let threads = provider.counting_threads.lock().unwrap().clone();
    assert_eq!(threads.len(), 2);
    assert!(threads.iter().all(|thread| *thread != runtime_thread));
}

#[tokio::test]
async fn disconnect_while_counting_tokens_refunds() {
    let provider = Arc::new(RecordingProvider {
        count_delay: Duration::from_millis(300),
        ..Default::default()
    });
    let (gateway, store) = setup_with(provider.clone()).await;

    let mut events = gateway.open_stream("alice", request("hi")).await.unwrap();
    assert_eq!(events.next().await, Some(StreamEvent::fragment("recorded")));
    assert_eq!(events.next().await, Some(StreamEvent::fragment(" reply")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(events);

    wait_for_balance(&store, "alice", DEFAULT_GENERATIONS).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.remaining("alice").await.unwrap(), DEFAULT_GENERATIONS);
    assert!(gateway.history("alice", 1, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn title_requires_remaining_quota() {
    let (gateway, store) = setup(Script::Reply(vec!["ok"])).await;
    store.grant("alice", -DEFAULT_GENERATIONS).await.unwrap();
    assert!(matches!(
        gateway.generate_title("alice", request("x")).await,
        Err(GatewayError::QuotaExceeded)
    ));
}

#[tokio::test]
async fn history_paging_is_validated() {
    let (gateway, _store) = setup(Script::Reply(vec!["ok"])).await;
    assert!(matches!(gateway.history("alice", 0, 10).await, Err(GatewayError::BadRequest(_))));
    assert!(matches!(gateway.history("alice", 1, 0).await, Err(GatewayError::BadRequest(_))));
    assert!(matches!(gateway.history("alice", 1, 101).await, Err(GatewayError::BadRequest(_))));

    for n in 0..3 {
        collect(&gateway, "alice", request(&format!("q{n}"))).await;
    }
    let first = gateway.history("alice", 1, 2).await.unwrap();
    let second = gateway.history("alice", 2, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 1);
    assert!(first[0].updated_at >= first[1].updated_at);
}

#[tokio::test]
async fn model_catalog_is_exposed() {
    let (gateway, _store) = setup(Script::Reply(vec![])).await;
    let models = gateway.models();
    assert!(models.iter().any(|model| model.id == "gpt-4o-mini"));
    assert_eq!(models.len(), gateway.registry().len());
}
