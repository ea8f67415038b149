mod app;
mod middleware;
mod state;

pub use app::create_app;
pub use middleware::session_cookie;
pub use state::AppState;
