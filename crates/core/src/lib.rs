pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use config::{AppConfig, ConfigError, LoadOptions};
pub use domain::card::{mask_card_identifier, CardIdentifierError, CardLastFour};
pub use domain::intent::{ActionDetails, ClassifiedIntent, IntentKind, Request};
pub use domain::outcome::{AgentOutcome, RouterResult};
pub use errors::{ApplicationError, DomainError, InterfaceError, RoutingError};
pub use flows::{FlowEngine, RouterAction, RouterEvent, RouterState, TransitionError};
