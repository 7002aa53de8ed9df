pub mod error;
pub mod handlers;
pub mod jobs;
pub mod routes;
pub mod runner;
pub mod server;
pub mod state;

pub use error::*;
pub use jobs::*;
pub use routes::*;
pub use server::*;
pub use state::*;
