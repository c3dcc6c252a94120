pub mod adjudication;
pub mod cvr;
pub mod election;
pub mod error;
pub mod filter;
pub mod ids;
pub mod results;

pub use error::CoreError;
pub use ids::*;
