//! Hardware-information parsers for RISC-V interrupt topology.
//!
//! The dispatcher ([`parse_riscv_intc`]) runs the resolvers in order:
//!
//! 1. [`topology`] builds one [`HartRecord`](hartcap_cm::HartRecord) per CPU node.
//! 2. [`imsic`] finds the S-level IMSIC, if any, and fills in each hart's
//!    interrupt-file page.
//! 3. [`plic_aplic`] walks PLIC/APLIC banks, assigns GSI ranges, and writes
//!    each hart's external interrupt controller id.
//!
//! The two optional resolvers write disjoint hart fields through the views
//! handed out by [`HartTable`]. [`cpu_info`] separately discovers the timer,
//! ISA string and cache-block sizes that feed the RHCT.

pub mod cpu_info;
pub mod dispatch;
pub mod error;
pub mod gsi;
pub mod hart_table;
pub mod imsic;
pub mod plic_aplic;
mod props;
pub mod topology;

pub use dispatch::{parse_riscv_intc, IntcResolution};
pub use error::{ParseError, Result};
pub use gsi::GsiRegistry;
pub use hart_table::{ExtIntcView, HartTable, ImsicView};

/// Interrupt level of the supervisor external interrupt.
pub const IRQ_S_EXT: u32 = 9;
