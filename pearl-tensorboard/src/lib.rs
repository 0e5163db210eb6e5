//! Recorder writing aggregated records to TFRecord files.
use log::warn;
use pearl_core::record::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Write records to TFRecord.
///
/// The step of every value is taken from the `"epoch"` entry of the record.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    step_key: String,
    storage: RecordStorage,
}

impl TensorboardRecorder {
    /// Construct a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            step_key: "epoch".to_string(),
            storage: RecordStorage::new(),
        }
    }
}

impl Recorder for TensorboardRecorder {
    /// Write a given [`Record`] into a TFRecord.
    ///
    /// Scalars are written as they are. Each element of a [`RecordValue::Array1`]
    /// is written as a scalar `<key>/<index>`, so that an online return curve
    /// shows up as one plot per rollout.
    fn write(&mut self, record: Record) {
        let step = match record.get(&self.step_key) {
            Some(RecordValue::Scalar(v)) => *v as usize,
            _ => {
                warn!("Record without {:?} is not written", self.step_key);
                return;
            }
        };

        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                RecordValue::Array1(vs) => {
                    for (i, v) in vs.iter().enumerate() {
                        self.writer.add_scalar(&format!("{}/{}", k, i), *v, step);
                    }
                }
            }
        }
    }
}

impl AggregateRecorder for TensorboardRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, epoch: i64) {
        let mut record = self.storage.aggregate();
        record.insert(self.step_key.clone(), RecordValue::Scalar(epoch as f32));
        self.write(record);
        self.writer.flush();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;
    use tempdir::TempDir;

    fn event_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files = vec![];
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("events.out.tfevents"))
            {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Encoded `Summary.Value` holding `tag` and `value`.
    fn scalar_bytes(tag: &str, value: f32) -> Vec<u8> {
        let mut bytes = vec![0x0a, tag.len() as u8];
        bytes.extend_from_slice(tag.as_bytes());
        bytes.push(0x15);
        bytes.extend_from_slice(&value.to_le_bytes());
        bytes
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_flush_writes_aggregated_scalars() -> std::io::Result<()> {
        let dir = TempDir::new("pearl_tensorboard")?;
        let mut recorder = TensorboardRecorder::new(dir.path());
        recorder.store(Record::from_scalar("QF1 Loss", 1.0));
        recorder.store(Record::from_scalar("QF1 Loss", 3.0));
        recorder.store(Record::from_slice(&[(
            "OnlineReturns_test_tasks",
            RecordValue::Array1(vec![-3.0, -2.0]),
        )]));
        recorder.flush(0);

        // The event file is written by a background thread joined on drop.
        drop(recorder);

        let files = event_files(dir.path())?;
        assert_eq!(files.len(), 1);
        let bytes = std::fs::read(&files[0])?;
        assert!(contains(&bytes, &scalar_bytes("QF1 Loss_mean", 2.0)));
        assert!(contains(&bytes, &scalar_bytes("QF1 Loss_max", 3.0)));
        assert!(contains(
            &bytes,
            &scalar_bytes("OnlineReturns_test_tasks/1", -2.0)
        ));
        Ok(())
    }

    #[test]
    fn test_record_without_step_is_skipped() -> std::io::Result<()> {
        let dir = TempDir::new("pearl_tensorboard")?;
        let mut recorder = TensorboardRecorder::new(dir.path());
        recorder.write(Record::from_scalar("QF1 Loss", 5.0));
        drop(recorder);

        let files = event_files(dir.path())?;
        let bytes = std::fs::read(&files[0])?;
        assert!(!contains(&bytes, b"QF1 Loss"));
        Ok(())
    }
}
