//! Records of per-epoch statistics and the recorders consuming them.
//!
//! A [`Record`] is a map from a string key to a [`RecordValue`]. The
//! meta-training loop and the agents produce records (losses, returns,
//! latent statistics, timings), which are handed to an
//! [`AggregateRecorder`]. Records stored several times within an epoch are
//! reduced by [`RecordStorage`] when the recorder is flushed.
//!
//! ```rust
//! use pearl_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("QF1 Loss", 0.25);
//! record.insert("OnlineReturns_test_tasks", RecordValue::Array1(vec![-3.0, -2.5]));
//! assert_eq!(record.get_scalar("QF1 Loss").unwrap(), 0.25);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod stats;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::{AggregateRecorder, Recorder};
pub use stats::{stats_record, std_dev};
pub use storage::RecordStorage;
