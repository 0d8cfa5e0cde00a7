//! Typed configuration records.
//!
//! Each record mirrors one normalized hardware fact. [`CmObject`] wraps every
//! record type so heterogeneous batches can be published to a
//! [`ConfigStore`](crate::store::ConfigStore) in one call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CmError, Result};
use crate::store::ConfigStore;

/// `flags` bit marking a hart as enabled.
pub const HART_FLAG_ENABLED: u32 = 1 << 0;

/// Current version of every record layout.
pub const RECORD_VERSION: u8 = 1;

/// One discovered hart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HartRecord {
    pub version: u8,
    pub flags: u32,
    /// Hart id read from the CPU node's `reg`.
    pub hart_id: u64,
    /// Position of the hart in discovery order.
    pub acpi_processor_uid: u32,
    /// `(bank_id << 24) | context`; 0 until a controller bank claims the hart.
    pub ext_intc_id: u32,
    /// Base of this hart's IMSIC interrupt file; 0 when there is none.
    pub imsic_base_address: u64,
    pub imsic_size: u32,
}

impl HartRecord {
    /// A freshly discovered, enabled hart with no controller wiring yet.
    pub fn new(hart_id: u64, acpi_processor_uid: u32) -> Self {
        Self {
            version: RECORD_VERSION,
            flags: HART_FLAG_ENABLED,
            hart_id,
            acpi_processor_uid,
            ext_intc_id: 0,
            imsic_base_address: 0,
            imsic_size: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flags & HART_FLAG_ENABLED != 0
    }
}

/// Controller family a bank belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BankFamily {
    /// Platform-level interrupt controller: one context pair per hart.
    Plic,
    /// Advanced platform-level interrupt controller: one IDC per hart.
    Aplic,
}

impl BankFamily {
    /// ACPI hardware id reported for banks of this family.
    pub const fn hw_id(self) -> [u8; 8] {
        match self {
            BankFamily::Plic => *b"RSCV0001",
            BankFamily::Aplic => *b"RSCV0002",
        }
    }

    pub const fn object_kind(self) -> ObjectKind {
        match self {
            BankFamily::Plic => ObjectKind::Plic,
            BankFamily::Aplic => ObjectKind::Aplic,
        }
    }
}

impl fmt::Display for BankFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankFamily::Plic => write!(f, "PLIC"),
            BankFamily::Aplic => write!(f, "APLIC"),
        }
    }
}

/// One PLIC or APLIC instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ControllerBankRecord {
    pub version: u8,
    /// Bank index in discovery order; the top byte of every ext-intc id it
    /// assigns.
    pub id: u32,
    pub family: BankFamily,
    pub hw_id: [u8; 8],
    pub num_sources: u32,
    /// Number of interrupt delivery controls (APLIC only, 0 for PLIC).
    pub num_idcs: u32,
    pub base_address: u64,
    pub size: u32,
    /// First global system interrupt number routed through this bank.
    pub gsi_base: u32,
}

impl ControllerBankRecord {
    pub fn new(family: BankFamily, id: u32) -> Self {
        Self {
            version: RECORD_VERSION,
            id,
            family,
            hw_id: family.hw_id(),
            num_sources: 0,
            num_idcs: 0,
            base_address: 0,
            size: 0,
            gsi_base: 0,
        }
    }

    pub fn hw_id_str(&self) -> String {
        String::from_utf8_lossy(&self.hw_id).into_owned()
    }
}

/// The S-level IMSIC message-interrupt receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MsgReceiverRecord {
    pub version: u8,
    pub flags: u32,
    pub num_ids: u32,
    pub num_guest_ids: u32,
    pub guest_index_bits: u32,
    pub hart_index_bits: u32,
    pub group_index_bits: u32,
    pub group_index_shift: u32,
}

/// Base ISA string shared by all harts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IsaStringRecord {
    pub isa: String,
}

/// Cache-block management operation sizes, each as log2 of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheBlockRecord {
    pub cbom_block_size: u8,
    pub cbop_block_size: u8,
    pub cboz_block_size: u8,
}

impl CacheBlockRecord {
    /// Build from sizes in bytes. Zero is kept as "not implemented"; any
    /// other size must be a power of two.
    pub fn from_bytes(cbom: u64, cbop: u64, cboz: u64) -> Option<Self> {
        Some(Self {
            cbom_block_size: block_size_log2(cbom)?,
            cbop_block_size: block_size_log2(cbop)?,
            cboz_block_size: block_size_log2(cboz)?,
        })
    }
}

/// log2 of a power-of-two block size; `Some(0)` for 0.
pub fn block_size_log2(bytes: u64) -> Option<u8> {
    match bytes {
        0 => Some(0),
        b if b.is_power_of_two() => u8::try_from(b.trailing_zeros()).ok(),
        _ => None,
    }
}

/// Platform timer description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimerRecord {
    pub timebase_frequency: u64,
    #[serde(default)]
    pub timer_cannot_wake_cpu: bool,
}

/// Type tag of a [`CmObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectKind {
    Rintc,
    Plic,
    Aplic,
    Imsic,
    IsaString,
    Cmo,
    Timer,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Rintc => "hart",
            ObjectKind::Plic => "PLIC",
            ObjectKind::Aplic => "APLIC",
            ObjectKind::Imsic => "IMSIC",
            ObjectKind::IsaString => "ISA string",
            ObjectKind::Cmo => "CMO",
            ObjectKind::Timer => "timer",
        };
        f.write_str(name)
    }
}

/// Any record that can live in a configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CmObject {
    Hart(HartRecord),
    ControllerBank(ControllerBankRecord),
    MsgReceiver(MsgReceiverRecord),
    IsaString(IsaStringRecord),
    CacheBlock(CacheBlockRecord),
    Timer(TimerRecord),
}

impl CmObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            CmObject::Hart(_) => ObjectKind::Rintc,
            CmObject::ControllerBank(bank) => bank.family.object_kind(),
            CmObject::MsgReceiver(_) => ObjectKind::Imsic,
            CmObject::IsaString(_) => ObjectKind::IsaString,
            CmObject::CacheBlock(_) => ObjectKind::Cmo,
            CmObject::Timer(_) => ObjectKind::Timer,
        }
    }
}

/// Typed access to the record inside a [`CmObject`].
pub trait CmRecord: Sized {
    /// Kinds under which records of this type are stored.
    const KINDS: &'static [ObjectKind];

    fn from_object(object: &CmObject) -> Option<&Self>;

    fn into_object(self) -> CmObject;
}

macro_rules! cm_record {
    ($ty:ty, $variant:ident, [$($kind:ident),+]) => {
        impl CmRecord for $ty {
            const KINDS: &'static [ObjectKind] = &[$(ObjectKind::$kind),+];

            fn from_object(object: &CmObject) -> Option<&Self> {
                match object {
                    CmObject::$variant(record) => Some(record),
                    _ => None,
                }
            }

            fn into_object(self) -> CmObject {
                CmObject::$variant(self)
            }
        }

        impl From<$ty> for CmObject {
            fn from(record: $ty) -> Self {
                CmObject::$variant(record)
            }
        }
    };
}

cm_record!(HartRecord, Hart, [Rintc]);
cm_record!(ControllerBankRecord, ControllerBank, [Plic, Aplic]);
cm_record!(MsgReceiverRecord, MsgReceiver, [Imsic]);
cm_record!(IsaStringRecord, IsaString, [IsaString]);
cm_record!(CacheBlockRecord, CacheBlock, [Cmo]);
cm_record!(TimerRecord, Timer, [Timer]);

/// Platform-wide records that are not derived from interrupt wiring.
///
/// These come from CPU properties in the tree or from a platform file; the
/// platform file wins field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlatformRecords {
    pub timer: Option<TimerRecord>,
    pub isa_string: Option<IsaStringRecord>,
    pub cmo: Vec<CacheBlockRecord>,
}

impl PlatformRecords {
    /// Fill every field left empty in `self` from `base`.
    pub fn merge_over(self, base: PlatformRecords) -> PlatformRecords {
        PlatformRecords {
            timer: self.timer.or(base.timer),
            isa_string: self.isa_string.or(base.isa_string),
            cmo: if self.cmo.is_empty() { base.cmo } else { self.cmo },
        }
    }

    /// Publish every present record.
    pub fn publish(self, store: &mut (impl ConfigStore + ?Sized)) -> Result<()> {
        let mut objects = Vec::new();
        objects
            .try_reserve_exact(2 + self.cmo.len())
            .map_err(|_| CmError::OutOfResources {
                kind: ObjectKind::Cmo,
                count: self.cmo.len(),
            })?;
        objects.extend(self.timer.map(CmObject::Timer));
        objects.extend(self.isa_string.map(CmObject::IsaString));
        objects.extend(self.cmo.into_iter().map(CmObject::CacheBlock));
        if objects.is_empty() {
            return Ok(());
        }
        store.publish(objects)
    }
}
