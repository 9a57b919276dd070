pub mod orchestrator;
pub mod progress;
pub mod resolve;

pub use orchestrator::DownloadOrchestrator;
pub use progress::DownloadEvent;
