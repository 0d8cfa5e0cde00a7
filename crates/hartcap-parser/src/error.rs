use hartcap_cm::{BankFamily, CmError, ErrorKind};

/// Errors produced while resolving interrupt topology.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// A node the resolvers require, such as `/cpus`, is absent.
    #[error("required node {path} not found")]
    MissingNode {
        /// Absolute path that was looked up.
        path: &'static str,
    },

    /// `/cpus` exists but holds no cpu children.
    #[error("no cpu nodes under {cpus}")]
    NoCpus {
        /// Path of the `/cpus` node.
        cpus: String,
    },

    /// A cpu node is not a RISC-V hart.
    #[error("{node}: not compatible with \"riscv\"")]
    UnsupportedCpu {
        /// Path of the offending cpu node.
        node: String,
    },

    /// Hart ids must be one or two cells wide.
    #[error("{node}: #address-cells is {cells}, expected 1 or 2")]
    BadAddressCells {
        /// Path of the node carrying the cell count.
        node: String,
        /// The `#address-cells` value found.
        cells: u32,
    },

    /// A cpu `reg` is shorter than the hart id width.
    #[error("{node}: reg holds fewer than {cells} cell(s)")]
    BadHartReg {
        /// Path of the cpu node.
        node: String,
        /// Number of cells the hart id needs.
        cells: u32,
    },

    /// Two cpu nodes claim the same hart id.
    #[error("hart id {hart_id:#x} appears on more than one cpu node")]
    DuplicateHart {
        /// The repeated hart id.
        hart_id: u64,
    },

    /// A property the resolvers need is absent.
    #[error("{node}: missing required property {property}")]
    MissingProperty {
        /// Path of the node that lacks the property.
        node: String,
        /// Name of the missing property.
        property: &'static str,
    },

    /// A property is present but its value cannot be used.
    #[error("{node}: malformed {property}")]
    MalformedProperty {
        /// Path of the node carrying the property.
        node: String,
        /// Name of the malformed property.
        property: &'static str,
    },

    /// An interrupt reference names a phandle no node carries.
    #[error("{node}: phandle {phandle:#x} does not resolve")]
    DanglingPhandle {
        /// Path of the node holding the reference.
        node: String,
        /// The unresolved phandle.
        phandle: u32,
    },

    /// A referenced hart-local controller does not sit under a cpu node.
    #[error("{node}: interrupt controller has no parent cpu")]
    OrphanController {
        /// Path of the controller node.
        node: String,
    },

    /// A controller targets a hart the hart table does not hold.
    #[error("no hart with id {hart_id:#x}")]
    UnknownHart {
        /// The hart id that was looked up.
        hart_id: u64,
    },

    /// PLIC and APLIC banks both claim the same hart.
    #[error("hart {hart_id:#x} is already wired to a {existing} bank, refusing {requested} id")]
    FamilyConflict {
        /// The contested hart.
        hart_id: u64,
        /// Family that wired the hart first.
        existing: BankFamily,
        /// Family whose write was refused.
        requested: BankFamily,
    },

    /// A bank id or context does not fit the external interrupt controller id.
    #[error("bank {bank_id} context {context:#x} does not fit an 8-bit bank and 24-bit context")]
    ExtIntcIdOverflow {
        /// Discovery index of the bank.
        bank_id: u32,
        /// Context or IDC number within the bank.
        context: u32,
    },

    /// Storage for a record list could not be reserved.
    #[error("could not reserve storage for {count} {what}")]
    OutOfResources {
        /// What was being stored.
        what: &'static str,
        /// Number of entries requested.
        count: usize,
    },

    /// Publishing to or reading from the configuration store failed.
    #[error(transparent)]
    Store(#[from] CmError),
}

impl ParseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::MissingNode { .. }
            | ParseError::NoCpus { .. }
            | ParseError::DanglingPhandle { .. }
            | ParseError::OrphanController { .. }
            | ParseError::UnknownHart { .. } => ErrorKind::NotFound,
            ParseError::UnsupportedCpu { .. } => ErrorKind::Unsupported,
            ParseError::BadAddressCells { .. }
            | ParseError::BadHartReg { .. }
            | ParseError::FamilyConflict { .. } => ErrorKind::Aborted,
            ParseError::DuplicateHart { .. }
            | ParseError::MissingProperty { .. }
            | ParseError::MalformedProperty { .. }
            | ParseError::ExtIntcIdOverflow { .. } => ErrorKind::InvalidParameter,
            ParseError::OutOfResources { .. } => ErrorKind::OutOfResources,
            ParseError::Store(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
