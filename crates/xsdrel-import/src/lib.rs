pub mod error;
pub mod executor;
pub mod importer;
pub mod value;

pub use error::{ImportError, Result};
pub use executor::memory::MemoryExecutor;
pub use executor::tiberius_executor::TiberiusExecutor;
pub use executor::SqlExecutor;
pub use importer::{ImportOptions, ImportResult, Importer, SkipReason, SkippedElement};
pub use value::Value;
