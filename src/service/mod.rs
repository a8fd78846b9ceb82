pub mod http;
pub mod status;

pub use http::AggregateHttpApp;
pub use status::StatusHttpApp;
