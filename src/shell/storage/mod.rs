//! Storage abstraction for shell sessions.

mod session;
mod traits;

pub use session::DashMapSessionStorage;
pub use traits::SessionStorage;
