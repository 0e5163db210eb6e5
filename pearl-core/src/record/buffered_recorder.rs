use super::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};

/// A recorder keeping records in memory.
///
/// Flushed aggregations are kept together with the epoch they were flushed
/// at, under the key `"epoch"`. Used in tests and for inspecting a short run.
#[derive(Default)]
pub struct BufferedRecorder {
    buf: Vec<Record>,
    storage: RecordStorage,
}

impl BufferedRecorder {
    /// Constructs the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the written records.
    pub fn iter(&self) -> std::slice::Iter<Record> {
        self.buf.iter()
    }

    /// Number of written records.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.buf.push(record);
    }
}

impl AggregateRecorder for BufferedRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, epoch: i64) {
        let mut record = self.storage.aggregate();
        record.insert("epoch", RecordValue::Scalar(epoch as f32));
        self.write(record);
    }
}
