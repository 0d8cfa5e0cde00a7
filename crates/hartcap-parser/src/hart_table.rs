//! The ordered hart records and the field-scoped views resolvers write
//! through.
//!
//! Each optional resolver owns a different slice of every [`HartRecord`]:
//! the IMSIC resolver owns the interrupt-file fields, the PLIC/APLIC resolver
//! owns `ext_intc_id`. The views below only expose their own fields, so
//! neither can clobber the other's work.

use hartcap_cm::{BankFamily, HartRecord};
use tracing::debug;

use crate::error::{ParseError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HartTable {
    harts: Vec<HartRecord>,
    /// Family that last wrote each hart's `ext_intc_id`.
    wired_by: Vec<Option<BankFamily>>,
}

impl HartTable {
    /// Empty table with room for `count` harts.
    pub fn with_capacity(count: usize) -> Result<Self> {
        let mut harts = Vec::new();
        let mut wired_by = Vec::new();
        harts
            .try_reserve_exact(count)
            .and_then(|()| wired_by.try_reserve_exact(count))
            .map_err(|_| ParseError::OutOfResources {
                what: "hart records",
                count,
            })?;
        Ok(Self { harts, wired_by })
    }

    /// Append a hart. Hart ids must be unique.
    pub fn push(&mut self, record: HartRecord) -> Result<()> {
        if self.position(record.hart_id).is_some() {
            return Err(ParseError::DuplicateHart {
                hart_id: record.hart_id,
            });
        }
        self.harts.push(record);
        self.wired_by.push(None);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.harts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.harts.is_empty()
    }

    pub fn records(&self) -> &[HartRecord] {
        &self.harts
    }

    pub fn get(&self, hart_id: u64) -> Option<&HartRecord> {
        self.position(hart_id).map(|i| &self.harts[i])
    }

    pub fn into_records(self) -> Vec<HartRecord> {
        self.harts
    }

    pub fn imsic_view(&mut self) -> ImsicView<'_> {
        ImsicView { table: self }
    }

    pub fn ext_intc_view(&mut self) -> ExtIntcView<'_> {
        ExtIntcView { table: self }
    }

    fn position(&self, hart_id: u64) -> Option<usize> {
        self.harts.iter().position(|h| h.hart_id == hart_id)
    }

    fn index_of(&self, hart_id: u64) -> Result<usize> {
        self.position(hart_id)
            .ok_or(ParseError::UnknownHart { hart_id })
    }
}

/// Write access to the IMSIC interrupt-file fields only.
#[derive(Debug)]
pub struct ImsicView<'a> {
    table: &'a mut HartTable,
}

impl ImsicView<'_> {
    /// Point a hart at its interrupt-file page.
    pub fn set_interrupt_file(&mut self, hart_id: u64, base_address: u64, size: u32) -> Result<()> {
        let index = self.table.index_of(hart_id)?;
        let hart = &mut self.table.harts[index];
        hart.imsic_base_address = base_address;
        hart.imsic_size = size;
        debug!(
            hart_id,
            base = format_args!("{base_address:#x}"),
            size,
            "assigned IMSIC interrupt file"
        );
        Ok(())
    }
}

/// Write access to `ext_intc_id` only.
#[derive(Debug)]
pub struct ExtIntcView<'a> {
    table: &'a mut HartTable,
}

impl ExtIntcView<'_> {
    /// Record the external interrupt controller context serving a hart.
    ///
    /// A later bank of the same family may overwrite an earlier one; a bank
    /// of the other family may not.
    pub fn set_ext_intc_id(&mut self, hart_id: u64, family: BankFamily, ext_intc_id: u32) -> Result<()> {
        let index = self.table.index_of(hart_id)?;
        if let Some(existing) = self.table.wired_by[index] {
            if existing != family {
                return Err(ParseError::FamilyConflict {
                    hart_id,
                    existing,
                    requested: family,
                });
            }
        }
        self.table.harts[index].ext_intc_id = ext_intc_id;
        self.table.wired_by[index] = Some(family);
        debug!(
            hart_id,
            %family,
            ext_intc_id = format_args!("{ext_intc_id:#010x}"),
            "assigned external interrupt controller"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hartcap_cm::ErrorKind;

    fn table(ids: &[u64]) -> HartTable {
        let mut table = HartTable::with_capacity(ids.len()).unwrap();
        for (uid, &id) in ids.iter().enumerate() {
            table.push(HartRecord::new(id, uid as u32)).unwrap();
        }
        table
    }

    #[test]
    fn duplicate_hart_ids_are_rejected() {
        let mut table = table(&[0, 1]);
        let err = table.push(HartRecord::new(1, 2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn views_write_only_their_fields() {
        let mut table = table(&[0, 5]);
        table
            .imsic_view()
            .set_interrupt_file(5, 0x2800_1000, 0x1000)
            .unwrap();
        table
            .ext_intc_view()
            .set_ext_intc_id(5, BankFamily::Aplic, 1)
            .unwrap();

        let hart = table.get(5).unwrap();
        assert_eq!(hart.imsic_base_address, 0x2800_1000);
        assert_eq!(hart.imsic_size, 0x1000);
        assert_eq!(hart.ext_intc_id, 1);
        assert_eq!(table.get(0).unwrap(), &HartRecord::new(0, 0));
    }

    #[test]
    fn unknown_hart_is_not_found() {
        let mut table = table(&[0]);
        let err = table
            .imsic_view()
            .set_interrupt_file(7, 0, 0x1000)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn families_cannot_share_a_hart() {
        let mut table = table(&[0]);
        let mut view = table.ext_intc_view();
        view.set_ext_intc_id(0, BankFamily::Plic, 1).unwrap();
        view.set_ext_intc_id(0, BankFamily::Plic, (1 << 24) | 1).unwrap();
        let err = view.set_ext_intc_id(0, BankFamily::Aplic, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Aborted);
        assert_eq!(table.get(0).unwrap().ext_intc_id, (1 << 24) | 1);
    }
}
