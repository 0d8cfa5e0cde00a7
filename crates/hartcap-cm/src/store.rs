//! The configuration store: where parsers publish records and generators
//! fetch them.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::error::{CmError, Result};
use crate::records::{CmObject, CmRecord, ObjectKind};

/// Publish/fetch surface shared by parsers and table generators.
pub trait ConfigStore {
    /// Append a batch of records. Records keep their publication order
    /// within each kind.
    fn publish(&mut self, objects: Vec<CmObject>) -> Result<()>;

    /// All records of one kind, in publication order.
    fn fetch(&self, kind: ObjectKind) -> &[CmObject];
}

/// Typed view over every record of type `T`, in kind order then publication
/// order.
pub fn fetch_records<T, S>(store: &S) -> Vec<&T>
where
    T: CmRecord,
    S: ConfigStore + ?Sized,
{
    T::KINDS
        .iter()
        .flat_map(|&kind| store.fetch(kind))
        .filter_map(T::from_object)
        .collect()
}

/// The single record of type `T`, if any. More than one is an error.
pub fn fetch_optional<T, S>(store: &S) -> Result<Option<&T>>
where
    T: CmRecord,
    S: ConfigStore + ?Sized,
{
    let records = fetch_records::<T, S>(store);
    match records.as_slice() {
        [] => Ok(None),
        [one] => Ok(Some(*one)),
        many => Err(CmError::TooMany {
            kind: T::KINDS[0],
            max: 1,
            found: many.len(),
        }),
    }
}

/// Exactly one record of type `T`.
pub fn fetch_single<T, S>(store: &S) -> Result<&T>
where
    T: CmRecord,
    S: ConfigStore + ?Sized,
{
    fetch_optional::<T, S>(store)?.ok_or(CmError::NotFound { kind: T::KINDS[0] })
}

/// In-memory store keyed by object kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigRepository {
    objects: BTreeMap<ObjectKind, Vec<CmObject>>,
}

impl ConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all kinds.
    pub fn len(&self) -> usize {
        self.objects.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record of `kind`, returning them.
    pub fn remove(&mut self, kind: ObjectKind) -> Vec<CmObject> {
        self.objects.remove(&kind).unwrap_or_default()
    }

    /// Every record, in kind order.
    pub fn iter(&self) -> impl Iterator<Item = &CmObject> {
        self.objects.values().flatten()
    }
}

impl ConfigStore for ConfigRepository {
    fn publish(&mut self, objects: Vec<CmObject>) -> Result<()> {
        for object in objects {
            let kind = object.kind();
            let bucket = self.objects.entry(kind).or_default();
            bucket
                .try_reserve(1)
                .map_err(|_| CmError::OutOfResources { kind, count: 1 })?;
            bucket.push(object);
            debug!(%kind, total = bucket.len(), "published record");
        }
        Ok(())
    }

    fn fetch(&self, kind: ObjectKind) -> &[CmObject] {
        self.objects.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::records::{BankFamily, ControllerBankRecord, HartRecord, TimerRecord};

    fn timer(freq: u64) -> CmObject {
        CmObject::Timer(TimerRecord {
            timebase_frequency: freq,
            timer_cannot_wake_cpu: false,
        })
    }

    #[test]
    fn fetch_preserves_publication_order() {
        let mut repo = ConfigRepository::new();
        repo.publish(vec![
            HartRecord::new(0, 0).into(),
            timer(10_000_000),
            HartRecord::new(4, 1).into(),
        ])
        .unwrap();
        repo.publish(vec![HartRecord::new(2, 2).into()]).unwrap();

        let harts = fetch_records::<HartRecord, _>(&repo);
        let ids: Vec<u64> = harts.iter().map(|h| h.hart_id).collect();
        assert_eq!(ids, vec![0, 4, 2]);
        assert_eq!(repo.len(), 4);
    }

    #[test]
    fn banks_span_both_families() {
        let mut repo = ConfigRepository::new();
        repo.publish(vec![
            ControllerBankRecord::new(BankFamily::Aplic, 0).into(),
            ControllerBankRecord::new(BankFamily::Plic, 1).into(),
        ])
        .unwrap();
        assert_eq!(repo.fetch(ObjectKind::Plic).len(), 1);
        assert_eq!(repo.fetch(ObjectKind::Aplic).len(), 1);
        assert_eq!(fetch_records::<ControllerBankRecord, _>(&repo).len(), 2);
    }

    #[test]
    fn single_and_optional_fetch() {
        let mut repo = ConfigRepository::new();
        let missing = fetch_single::<TimerRecord, _>(&repo).unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert!(fetch_optional::<TimerRecord, _>(&repo).unwrap().is_none());

        repo.publish(vec![timer(1)]).unwrap();
        assert_eq!(
            fetch_single::<TimerRecord, _>(&repo).unwrap().timebase_frequency,
            1
        );

        repo.publish(vec![timer(2)]).unwrap();
        let err = fetch_single::<TimerRecord, _>(&repo).unwrap_err();
        assert!(matches!(err, CmError::TooMany { found: 2, .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn remove_clears_a_kind() {
        let mut repo = ConfigRepository::new();
        repo.publish(vec![timer(1), HartRecord::new(0, 0).into()]).unwrap();
        assert_eq!(repo.remove(ObjectKind::Timer).len(), 1);
        assert!(repo.fetch(ObjectKind::Timer).is_empty());
        assert!(!repo.is_empty());
    }
}
