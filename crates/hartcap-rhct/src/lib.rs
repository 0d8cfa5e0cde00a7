//! ACPI RISC-V Hart Capabilities Table (RHCT).
//!
//! The generator reads hart, ISA string, cache-block and timer records from a
//! [`ConfigStore`](hartcap_cm::ConfigStore) and lays them out as an RHCT.
//! All fields are little-endian.
//!
//! ## Table Layout
//!
//! ```text
//! RHCT:
//! ┌──────────────────────────────────┐
//! │ ACPI SDT header ("RHCT")         │  36 bytes
//! │ flags: u32                       │  bit 0: timer cannot wake cpu
//! │ time_base_frequency: u64         │
//! │ node_count: u32                  │
//! │ node_offset: u32                 │  always 56
//! ├──────────────────────────────────┤
//! │ ISA string node (0 or 1)         │  8 + align2(len + 1)
//! ├──────────────────────────────────┤
//! │ CMO nodes (0..N)                 │  10 bytes each
//! ├──────────────────────────────────┤
//! │ Hart info nodes (1 per hart)     │  12 + 4 * num_offsets
//! └──────────────────────────────────┘
//! ```
//!
//! Every node starts with `type: u16`, `length: u16`, `revision: u16`.
//! Hart info nodes reference the ISA string node and the first CMO node by
//! table offset.

pub mod acpi;
pub mod decode;
pub mod error;
pub mod generator;
pub mod indexer;
pub mod layout;

pub use acpi::{AcpiTableInfo, HeaderStamper, OemHeaderStamper};
pub use decode::{NodeBody, RhctNode, RhctView, SdtHeader};
pub use error::{Result, RhctError};
pub use generator::{RhctGenerator, RhctTable};
pub use indexer::{NodeIndexEntry, NodeIndexer, NodeSource};
