mod candidates;
mod error;
mod language;
mod participants;
mod ports;
mod prompt;
mod reply;
mod transcript;
mod types;

pub use candidates::*;
pub use error::*;
pub use language::*;
pub use participants::*;
pub use ports::*;
pub use prompt::*;
pub use reply::*;
pub use transcript::*;
pub use types::*;
