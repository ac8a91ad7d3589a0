mod health;
mod session;
mod util;

pub use health::{AuthHealthResponse, auth_health, health};
pub use session::{logout, not_found};
pub use util::json_response;
