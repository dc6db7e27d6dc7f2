//! Agent runtime for the financial-services assistant.
//!
//! A request flows through a fixed pipeline driven by the core `FlowEngine`:
//! 1. **Classification** (`classifier`) - free text to a structured `ClassifiedIntent`
//! 2. **Routing** - knowledge questions go to `knowledge`, card operations to `card`
//!    (after `guardrails` checks), anything else terminates early
//! 3. **Formatting** (`formatter`) - exactly one user-facing message per request
//!
//! The LLM only classifies and phrases answers. Whether a card action is allowed, and
//! what is sent to the card service, is decided by deterministic code.

pub mod card;
pub mod classifier;
pub mod formatter;
pub mod guardrails;
pub mod knowledge;
pub mod llm;
pub mod runtime;

#[cfg(test)]
mod testing;

pub use card::{CardActionClient, CardActionExecutor, CardApiError, CardApiResult, CardExecution};
pub use classifier::IntentClassifier;
pub use knowledge::{KnowledgeResponder, KnowledgeRetriever, Passage, RetrievalError};
pub use llm::{ChatRequest, LlmClient, LlmError, OpenAiCompatibleClient};
pub use runtime::AgentRuntime;
