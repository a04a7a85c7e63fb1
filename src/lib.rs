//! Streamcast library
//!
//! Finds the playable media behind a web page (headless browser or plain
//! fetch) and casts it, driven by a small playback state machine.

pub mod browser;
pub mod cast;
pub mod extractor;
pub mod session;
pub mod utils;

// Re-export main types for easier use
pub use browser::{BrowserController, BrowserDriver, ChromeDriver, ScrollDirection};
pub use cast::{CastSink, CastTarget, ChromecastSink, LoggingSink};
pub use extractor::{ExtractionCoordinator, ExtractionResult, MediaKind, StaticExtractor, StreamTarget, Strategy};
pub use session::{PlaybackSession, PlaybackState, SessionActor, SessionEvent, SessionHandle, SessionSnapshot};
pub use utils::{PlayerSettings, Result, StreamcastError};
