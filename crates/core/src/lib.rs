pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod forecast;

pub use cache::{CacheKey, CacheStats, ForecastCache, SearchCache, TtlCache};
pub use domain::conversation::{AgentReply, ConversationMessage, Role, ToolInvocation, ToolResult};
pub use domain::dataset::{Dataset, DatasetInfo};
pub use errors::{AgentError, PreconditionError};
pub use forecast::{ForecastError, ForecastMethod, ForecastOutcome, Forecaster};
