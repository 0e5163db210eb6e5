//! Aggregation of records stored within an epoch.
use super::{Record, RecordValue};
use std::collections::HashMap;
use xxhash_rust::xxh3::Xxh3Builder;

/// Stores records and reduces them to a single record.
///
/// Scalars stored once pass through unchanged. Scalars stored several times
/// are reduced to `<key>_min`, `<key>_max`, `<key>_mean` and `<key>_median`.
/// Other values keep the most recently stored one.
#[derive(Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn min(vs: &[f32]) -> RecordValue {
    RecordValue::Scalar(vs.iter().copied().fold(f32::INFINITY, f32::min))
}

fn max(vs: &[f32]) -> RecordValue {
    RecordValue::Scalar(vs.iter().copied().fold(f32::NEG_INFINITY, f32::max))
}

fn mean(vs: &[f32]) -> RecordValue {
    RecordValue::Scalar(vs.iter().sum::<f32>() / vs.len() as f32)
}

fn median(mut vs: Vec<f32>) -> RecordValue {
    vs.sort_by(|x, y| x.total_cmp(y));
    RecordValue::Scalar(vs[vs.len() / 2])
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self { data: vec![] }
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reduces the stored records into one and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut scalars: HashMap<String, Vec<f32>, Xxh3Builder> = HashMap::default();
        let mut latest: HashMap<String, RecordValue, Xxh3Builder> = HashMap::default();

        for record in self.data.drain(..) {
            for (k, v) in record.into_iter_in_record() {
                match v {
                    RecordValue::Scalar(v) => scalars.entry(k).or_default().push(v),
                    v => {
                        latest.insert(k, v);
                    }
                }
            }
        }

        let mut record = Record::empty();
        for (k, v) in latest.into_iter() {
            record.insert(k, v);
        }
        for (k, vs) in scalars.into_iter() {
            if vs.len() == 1 {
                record.insert(k, RecordValue::Scalar(vs[0]));
            } else {
                record.insert(format!("{}_min", k), min(&vs));
                record.insert(format!("{}_max", k), max(&vs));
                record.insert(format!("{}_mean", k), mean(&vs));
                record.insert(format!("{}_median", k), median(vs));
            }
        }
        record
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_aggregate() {
        let mut storage = RecordStorage::new();
        storage.store(Record::from_scalar("QF1 Loss", 1.0));
        storage.store(Record::from_scalar("QF1 Loss", 3.0));
        storage.store(Record::from_scalar("QF1 Loss", 2.0));
        storage.store(Record::from_scalar("Epoch", 4.0));
        storage.store(Record::from_slice(&[(
            "OnlineReturns_train_tasks",
            RecordValue::Array1(vec![1.0]),
        )]));
        storage.store(Record::from_slice(&[(
            "OnlineReturns_train_tasks",
            RecordValue::Array1(vec![2.0]),
        )]));

        let r = storage.aggregate();
        assert!(storage.is_empty());
        assert_eq!(r.get_scalar("QF1 Loss_min").unwrap(), 1.0);
        assert_eq!(r.get_scalar("QF1 Loss_max").unwrap(), 3.0);
        assert_eq!(r.get_scalar("QF1 Loss_mean").unwrap(), 2.0);
        assert_eq!(r.get_scalar("QF1 Loss_median").unwrap(), 2.0);
        assert_eq!(r.get_scalar("Epoch").unwrap(), 4.0);
        assert_eq!(r.get_array1("OnlineReturns_train_tasks").unwrap(), vec![2.0]);
    }
}
