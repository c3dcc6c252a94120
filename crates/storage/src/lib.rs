pub mod cvrs;
pub mod error;
mod filter_sql;
pub mod manual;
pub mod schema;
pub mod store;
pub mod tallies;
pub mod write_ins;

pub use cvrs::{
    CvrFileInsert, CvrFileOutcome, CvrFileRecord, CvrIngestOutcome, CvrStream, ScannerBatchRecord,
    sha256_hex,
};
pub use error::StorageError;
pub use manual::{ManualResultsKey, ManualResultsRecord};
pub use store::Store;
