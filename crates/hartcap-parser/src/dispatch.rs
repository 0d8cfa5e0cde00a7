//! Entry point running every interrupt-topology resolver in order.

use hartcap_cm::{CmObject, ConfigStore, ControllerBankRecord, HartRecord, MsgReceiverRecord};
use hartcap_fdt::TreeReader;
use serde::Serialize;
use tracing::info;

use crate::error::{ParseError, Result};
use crate::gsi::GsiRegistry;
use crate::imsic::resolve_msg_receiver;
use crate::plic_aplic::resolve_controller_banks;
use crate::topology::resolve_harts;

pub const CPUS_PATH: &str = "/cpus";

/// Everything resolved from one tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntcResolution {
    pub harts: Vec<HartRecord>,
    pub imsic: Option<MsgReceiverRecord>,
    pub banks: Vec<ControllerBankRecord>,
    pub gsi: GsiRegistry,
}

/// Resolve harts, the IMSIC and PLIC/APLIC banks, then publish the records.
///
/// Publication happens only after every resolver succeeded, so a failed run
/// leaves the store untouched.
pub fn parse_riscv_intc<T, S>(tree: &T, store: &mut S) -> Result<IntcResolution>
where
    T: TreeReader + ?Sized,
    S: ConfigStore + ?Sized,
{
    let cpus = tree
        .find_node(CPUS_PATH)
        .ok_or(ParseError::MissingNode { path: CPUS_PATH })?;

    let mut harts = resolve_harts(tree, cpus)?;
    let imsic = resolve_msg_receiver(tree, &mut harts.imsic_view())?.map(|r| r.record);
    let banks = resolve_controller_banks(tree, &mut harts.ext_intc_view())?;
    let harts = harts.into_records();

    let mut objects = Vec::new();
    let count = harts.len() + banks.banks.len() + usize::from(imsic.is_some());
    objects
        .try_reserve_exact(count)
        .map_err(|_| ParseError::OutOfResources {
            what: "configuration objects",
            count,
        })?;
    objects.extend(imsic.iter().cloned().map(CmObject::MsgReceiver));
    objects.extend(banks.banks.iter().cloned().map(CmObject::ControllerBank));
    objects.extend(harts.iter().cloned().map(CmObject::Hart));
    store.publish(objects)?;

    info!(
        harts = harts.len(),
        banks = banks.banks.len(),
        imsic = imsic.is_some(),
        "published interrupt topology"
    );
    Ok(IntcResolution {
        harts,
        imsic,
        banks: banks.banks,
        gsi: banks.gsi,
    })
}
