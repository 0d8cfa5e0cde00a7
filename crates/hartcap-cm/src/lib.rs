//! Configuration records and the record store shared by the hartcap parsers
//! and table generators.
//!
//! Parsers resolve the hardware description into typed records and publish
//! them here; table generators fetch them back without ever touching the
//! device tree. Platform facts that are not in the tree (or that need to be
//! overridden) come from a `.platform.toml` file.

pub mod error;
pub mod platform;
pub mod records;
pub mod store;

pub use error::{CmError, ErrorKind, Result};
pub use records::{
    BankFamily, CacheBlockRecord, CmObject, CmRecord, ControllerBankRecord, HartRecord,
    IsaStringRecord, MsgReceiverRecord, ObjectKind, PlatformRecords, TimerRecord, HART_FLAG_ENABLED,
    RECORD_VERSION,
};
pub use platform::{PlatformConfig, TableIdentity, ValidationIssue};
pub use store::{fetch_optional, fetch_records, fetch_single, ConfigRepository, ConfigStore};
