use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use finagent_core::domain::card::CardLastFour;

use crate::card::{CardActionClient, CardApiError, CardApiResult};
use crate::knowledge::{KnowledgeRetriever, Passage, RetrievalError};
use crate::llm::{ChatRequest, LlmClient, LlmError};

/// Serves `router` on an ephemeral localhost port and returns its base URL.
pub async fn spawn_stub(router: axum::Router) -> String {
    let listener =
        tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

/// Replays scripted completions in order; an exhausted script yields a transport error.
/// Keyed replies answer any request whose user message contains the key, before the script.
#[derive(Default)]
pub struct ScriptedLlm {
    keyed: Vec<(String, String)>,
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self { responses: Mutex::new(responses.into()), ..Self::default() }
    }

    pub fn replying(content: &str) -> Self {
        Self::new(vec![Ok(content.to_string())])
    }

    pub fn keyed(replies: &[(&str, &str)]) -> Self {
        Self {
            keyed: replies
                .iter()
                .map(|(key, reply)| (key.to_string(), reply.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push(request.clone());
        if let Some((_, reply)) = self.keyed.iter().find(|(key, _)| request.user.contains(key)) {
            return Ok(reply.clone());
        }
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".to_string())))
    }
}

pub struct FakeRetriever {
    result: Result<Vec<Passage>, RetrievalError>,
    queries: Mutex<Vec<(String, usize)>>,
    calls: AtomicUsize,
}

impl FakeRetriever {
    pub fn returning(passages: Vec<Passage>) -> Self {
        Self { result: Ok(passages), queries: Mutex::new(Vec::new()), calls: AtomicUsize::new(0) }
    }

    pub fn failing(error: RetrievalError) -> Self {
        Self { result: Err(error), queries: Mutex::new(Vec::new()), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().expect("queries lock").clone()
    }
}

#[async_trait]
impl KnowledgeRetriever for FakeRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().expect("queries lock").push((query.to_string(), k));
        self.result.clone()
    }

    fn mode(&self) -> &'static str {
        "fake"
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCardCall {
    pub action: String,
    pub card: String,
    pub parameters: BTreeMap<String, String>,
}

pub struct FakeCardClient {
    result: Result<CardApiResult, CardApiError>,
    recorded: Mutex<Vec<RecordedCardCall>>,
    calls: AtomicUsize,
}

impl FakeCardClient {
    pub fn returning(result: CardApiResult) -> Self {
        Self { result: Ok(result), recorded: Mutex::new(Vec::new()), calls: AtomicUsize::new(0) }
    }

    pub fn failing(error: CardApiError) -> Self {
        Self { result: Err(error), recorded: Mutex::new(Vec::new()), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<RecordedCardCall> {
        self.recorded.lock().expect("recorded lock").clone()
    }
}

#[async_trait]
impl CardActionClient for FakeCardClient {
    async fn perform(
        &self,
        action: &str,
        card: &CardLastFour,
        parameters: &BTreeMap<String, String>,
    ) -> Result<CardApiResult, CardApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.recorded.lock().expect("recorded lock").push(RecordedCardCall {
            action: action.to_string(),
            card: card.as_str().to_string(),
            parameters: parameters.clone(),
        });
        self.result.clone()
    }
}
