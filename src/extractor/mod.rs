pub mod coordinator;
pub mod media;
pub mod models;
pub mod static_page;
pub mod traits;
pub mod ytdlp;

pub use coordinator::{ExtractionCoordinator, Resolution, Ticket};
pub use models::{ExtractionResult, MediaKind, StreamTarget, Strategy};
pub use static_page::StaticExtractor;
pub use traits::Extractor;
pub use ytdlp::YtDlpExtractor;
