use super::Record;

/// Writes a record to an output destination.
pub trait Recorder {
    /// Writes a record.
    fn write(&mut self, record: Record);
}

/// Stores records and writes their aggregation once per epoch.
pub trait AggregateRecorder {
    /// Stores a record.
    fn store(&mut self, record: Record);

    /// Aggregates the stored records and writes them with the given epoch.
    fn flush(&mut self, epoch: i64);
}
