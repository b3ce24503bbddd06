//! Live engine analysis: debounced position submission, ranked lines,
//! depth-gated evaluations and SAN enrichment over a UCI channel.

pub mod aggregator;
pub mod config;
pub mod coordinator;
pub mod enrich;
pub mod normalize;
pub mod session;
pub mod types;

pub use aggregator::PvAggregator;
pub use config::{AnalysisConfig, CoordinatorConfig, SearchLimit};
pub use coordinator::{
    spawn_coordinator, AnalysisError, AnalysisEvent, AnalysisHandle, AnalysisSnapshot,
    EnginePhase, SessionSnapshot, UciDirection, UciLogEntry,
};
pub use normalize::{bar_position, DepthGate, PublishedEvaluation};
pub use session::{AnalysisSession, PositionRequest};
pub use types::{AnalysisScore, BestMove, EngineEvaluation, EngineStats, PrincipalVariation};
