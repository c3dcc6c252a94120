pub mod error;
pub mod groups;
pub mod tabulate;

pub use error::EngineError;
pub use groups::{enumerate_groups, filtered_contests};
pub use tabulate::{PartySplitResults, TabulateParams, tabulate, tabulate_party_split};
