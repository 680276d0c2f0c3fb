//! Market data access: source trait, in-memory source, synthetic data.

pub mod memory;
pub mod provider;
pub mod synthetic;

pub use memory::InMemorySource;
pub use provider::{MarketDataSource, SourceError};
pub use synthetic::{generate_symbol_records, synthetic_universe};
