pub mod error;
pub mod model;

pub use error::AppError;
pub use model::{
    ClipSection, CollisionPolicy, DownloadOutcome, DownloadPhase, DownloadRequest, ProgressEvent,
    ProgressPhase,
};
