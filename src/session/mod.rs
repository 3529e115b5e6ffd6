pub mod manager;
pub mod store;

pub use manager::{Session, SessionManager};
pub use store::SessionStore;
