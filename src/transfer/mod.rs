//! Sheet transfer - validation of sheet signatures, then chunked writes

pub mod engine;
pub mod plan;
pub mod sink;

pub use engine::{TransferConfig, TransferConfigBuilder, TransferEngine, TransferSummary};
pub use plan::WriteMode;
pub use sink::TableSink;
