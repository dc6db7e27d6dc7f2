use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use finagent_core::config::KnowledgeConfig;
use finagent_core::domain::outcome::AgentOutcome;
use finagent_core::errors::RoutingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{ChatRequest, LlmClient};

pub const NO_RESULTS_MESSAGE: &str = "I couldn't find specific information for your query";
pub const RETRIEVAL_APOLOGY: &str =
    "Sorry, I encountered an error while looking up that information. Please try again later.";
pub const GENERATION_APOLOGY: &str =
    "Sorry, I encountered an error while generating the response. Please try again later.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

impl Passage {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self { text: text.into(), source: source.into(), product_id: None, product_name: None }
    }

    pub fn with_product(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.product_id = Some(id.into());
        self.product_name = Some(name.into());
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("Failed to retrieve knowledge: request timed out: {0}")]
    Timeout(String),
    #[error("Failed to retrieve knowledge: {0}")]
    Transport(String),
    #[error("Failed to retrieve knowledge: search service returned status {status}")]
    Status { status: u16 },
    #[error("Failed to retrieve knowledge: malformed search response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for RetrievalError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_decode() {
            Self::Malformed(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Ranked passages, best first. An empty list is a valid answer.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError>;

    fn mode(&self) -> &'static str;
}

/// Vector-search service adapter: `POST {base_url}/search` with `{"query", "k"}`.
#[derive(Clone, Debug)]
pub struct HttpKnowledgeRetriever {
    client: reqwest::Client,
    search_url: String,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    k: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Passage>,
}

impl HttpKnowledgeRetriever {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, search_url: format!("{}/search", base_url.trim_end_matches('/')) })
    }
}

#[async_trait]
impl KnowledgeRetriever for HttpKnowledgeRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        let response =
            self.client.post(&self.search_url).json(&SearchRequest { query, k }).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Status { status: status.as_u16() });
        }

        let raw = response.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&raw)
            .map_err(|error| RetrievalError::Malformed(error.to_string()))?;

        let mut passages = parsed.results;
        passages.truncate(k);
        Ok(passages)
    }

    fn mode(&self) -> &'static str {
        "vector_search"
    }
}

/// Built-in product catalog used when no vector-search service is configured.
#[derive(Clone, Debug, Default)]
pub struct CatalogRetriever;

const CATALOG_SOURCE: &str = "healthcare_products";

impl CatalogRetriever {
    fn passage_for(query: &str) -> Passage {
        let query = query.to_ascii_lowercase();
        if query.contains("hsa") || query.contains("health savings") {
            Passage::new(
                "Health Savings Account (HSA) is a tax-advantaged savings account for individuals \
                 with high-deductible health plans. The 2024 contribution limit for individuals \
                 is $4,150 and for families is $8,300.",
                CATALOG_SOURCE,
            )
            .with_product("HSA001", "Health Savings Account (HSA)")
        } else if query.contains("fsa") || query.contains("flexible spending") {
            Passage::new(
                "Flexible Spending Account (FSA) is an employer-sponsored account allowing \
                 employees to set aside pre-tax dollars for eligible healthcare expenses. The \
                 2024 contribution limit is $3,200.",
                CATALOG_SOURCE,
            )
            .with_product("FSA001", "Flexible Spending Account (FSA)")
        } else {
            Passage::new(
                "Healthcare financial products include HSAs, FSAs, Dependent Care accounts, and \
                 Prepaid cards. Each has different eligibility requirements and benefits.",
                CATALOG_SOURCE,
            )
        }
    }
}

#[async_trait]
impl KnowledgeRetriever for CatalogRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Passage>, RetrievalError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![Self::passage_for(query)])
    }

    fn mode(&self) -> &'static str {
        "catalog"
    }
}

pub fn retriever_from_config(
    config: &KnowledgeConfig,
) -> Result<Arc<dyn KnowledgeRetriever>, RetrievalError> {
    match &config.base_url {
        Some(base_url) => Ok(Arc::new(HttpKnowledgeRetriever::new(
            base_url,
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(CatalogRetriever)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccountType {
    Hsa,
    Fsa,
    DependentCare,
    Prepaid,
    HealthCareSpend,
}

impl AccountType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hsa => "HSA",
            Self::Fsa => "FSA",
            Self::DependentCare => "Dependent Care",
            Self::Prepaid => "Prepaid",
            Self::HealthCareSpend => "Health Care Spend",
        }
    }
}

const ACCOUNT_TYPE_MENTIONS: &[(&str, AccountType)] = &[
    ("hsa", AccountType::Hsa),
    ("fsa", AccountType::Fsa),
    ("health savings account", AccountType::Hsa),
    ("flexible spending account", AccountType::Fsa),
    ("dependent care", AccountType::DependentCare),
    ("prepaid", AccountType::Prepaid),
    ("health care spend", AccountType::HealthCareSpend),
];

/// Account types mentioned in `query`, long names folded into HSA/FSA, without duplicates.
pub fn detect_account_types(query: &str) -> Vec<AccountType> {
    let query = query.to_ascii_lowercase();
    let mut detected = Vec::new();
    for (mention, account_type) in ACCOUNT_TYPE_MENTIONS {
        if query.contains(mention) && !detected.contains(account_type) {
            detected.push(*account_type);
        }
    }
    detected
}

pub fn compose_context(passages: &[Passage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(index, passage)| {
            let mut line =
                format!("Result {}: {} (Source: {})", index + 1, passage.text, passage.source);
            if let Some(name) = passage.product_name.as_deref().filter(|name| !name.is_empty()) {
                line.push_str(&format!(" (Product: {name})"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn generation_prompt(context: &str, query: &str, account_types: &[AccountType]) -> String {
    let mentioned = if account_types.is_empty() {
        "None specifically mentioned".to_string()
    } else {
        account_types.iter().map(AccountType::label).collect::<Vec<_>>().join(", ")
    };

    format!(
        "You are a healthcare financial expert assistant.\n\
         Answer the following question based only on the context provided.\n\n\
         Context:\n{context}\n\n\
         User's question: {query}\n\n\
         Account types mentioned: {mentioned}\n\n\
         Give a clear, concise, and accurate answer based on the context. If the context doesn't \
         contain the answer, acknowledge that you don't have enough information rather than \
         making up an answer."
    )
}

/// Answers informational questions from retrieved passages.
#[derive(Clone)]
pub struct KnowledgeResponder {
    retriever: Arc<dyn KnowledgeRetriever>,
    llm: Arc<dyn LlmClient>,
    top_k: usize,
}

impl KnowledgeResponder {
    pub fn new(
        retriever: Arc<dyn KnowledgeRetriever>,
        llm: Arc<dyn LlmClient>,
        top_k: usize,
    ) -> Self {
        Self { retriever, llm, top_k }
    }

    pub fn retriever_mode(&self) -> &'static str {
        self.retriever.mode()
    }

    pub async fn answer(&self, query: &str) -> AgentOutcome {
        let passages = match self.retriever.search(query, self.top_k).await {
            Ok(passages) => passages,
            Err(error) => {
                let failure = RoutingError::RetrievalFailure(error.to_string());
                tracing::warn!(
                    event_name = "knowledge.retrieval_failed",
                    error_code = failure.code(),
                    error = %failure,
                    "knowledge retrieval failed"
                );
                return AgentOutcome::failure(RETRIEVAL_APOLOGY, failure.to_string());
            }
        };

        if passages.is_empty() {
            tracing::info!(event_name = "knowledge.no_results", "retrieval returned no passages");
            return AgentOutcome::success(NO_RESULTS_MESSAGE);
        }

        let account_types = detect_account_types(query);
        let context = compose_context(&passages);
        tracing::debug!(
            event_name = "knowledge.context_composed",
            passages = passages.len(),
            account_types = ?account_types,
            "composed retrieval context"
        );

        let request = ChatRequest::new(generation_prompt(&context, query, &account_types), query);
        match self.llm.complete(&request).await {
            Ok(answer) => AgentOutcome::success(answer.trim()),
            Err(error) => {
                let failure = RoutingError::GenerationFailure(error.to_string());
                tracing::warn!(
                    event_name = "knowledge.generation_failed",
                    error_code = failure.code(),
                    error = %failure,
                    "answer generation failed"
                );
                AgentOutcome::failure(GENERATION_APOLOGY, failure.to_string())
            }
        }
    }
}
