//! Downstream sinks
//!
//! The primary store is synchronous and authoritative. The warehouse replica
//! and the object-store export are best-effort and run on the background pool.

pub mod ddl;
pub mod export;
pub mod primary;
pub mod warehouse;

pub use ddl::{validate_ddl, DdlExecutor, JobStatus, StatementApi, StatementJobs};
pub use export::{CsvObjectExporter, ObjectExporter, ObjectStoreExporter};
pub use primary::{ClickHouseStore, PrimaryStore};
pub use warehouse::{RedshiftStore, WarehouseReplicator, WarehouseStore};
