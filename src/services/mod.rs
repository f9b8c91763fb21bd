pub mod application_service;
pub mod catalog_expiry_task;
pub mod combination_service;
pub mod llm;
pub mod matching;
pub mod monitor_check_task;
pub mod monitor_service;
pub mod profile_service;
pub mod program_service;
pub mod result_cache;
pub mod search_service;

pub use application_service::ApplicationService;
pub use catalog_expiry_task::start_catalog_expiry_task;
pub use combination_service::{
    CombinationAnalysis, CombinationService, CombinationVerdict, PairValidation,
};
pub use llm::{LLMAnalyst, LLMClient, LLMError, LLMVerdict};
pub use matching::{Candidate, Match, RuleOutcome, RuleResult};
pub use monitor_check_task::{TaskHandle, start_monitor_check_task};
pub use monitor_service::{MonitorService, MonitorSweepReport};
pub use profile_service::ProfileService;
pub use program_service::ProgramService;
pub use result_cache::{CacheStats, MemoryCache, ResultCache, ResultCaches, StatsCache};
pub use search_service::{SearchInput, SearchOutput, SearchService};
