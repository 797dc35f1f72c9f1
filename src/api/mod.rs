pub mod routes;

pub use routes::{bind, create_router, serve, AppState};
