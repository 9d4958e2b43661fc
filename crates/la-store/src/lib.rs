pub mod backend;
pub mod export;
pub mod models;
pub mod store;

pub use backend::*;
pub use export::*;
pub use models::*;
pub use store::*;
