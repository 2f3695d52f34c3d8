pub mod archive;
pub mod session;
pub mod transcript;

pub use archive::TranscriptArchive;
pub use session::{ChatSession, SessionUpdate};
pub use transcript::{Message, Role, SessionTicket, Transcript};
