pub mod actor;
pub mod machine;
pub mod messages;
pub mod state;

pub use actor::{SessionActor, SessionHandle};
pub use machine::PlaybackSession;
pub use messages::{SessionCommand, SessionEvent};
pub use state::{PlaybackState, SessionSnapshot};
