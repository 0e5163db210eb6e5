use super::{Record, RecordValue};

/// Population standard deviation.
pub fn std_dev(vs: &[f32]) -> f32 {
    if vs.is_empty() {
        return 0.0;
    }
    let n = vs.len() as f32;
    let mean = vs.iter().sum::<f32>() / n;
    (vs.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n).sqrt()
}

/// Summarizes a distribution of values as `"<name> Mean"`, `"<name> Std"`,
/// `"<name> Max"` and `"<name> Min"`.
///
/// Returns an empty record for an empty slice.
pub fn stats_record(name: &str, vs: &[f32]) -> Record {
    if vs.is_empty() {
        return Record::empty();
    }
    let mean = vs.iter().sum::<f32>() / vs.len() as f32;
    let max = vs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let min = vs.iter().copied().fold(f32::INFINITY, f32::min);
    Record::from_slice(&[
        (format!("{} Mean", name), RecordValue::Scalar(mean)),
        (format!("{} Std", name), RecordValue::Scalar(std_dev(vs))),
        (format!("{} Max", name), RecordValue::Scalar(max)),
        (format!("{} Min", name), RecordValue::Scalar(min)),
    ])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stats_record() {
        let r = stats_record("Q Targets", &[1.0, 3.0]);
        assert_eq!(r.get_scalar("Q Targets Mean").unwrap(), 2.0);
        assert_eq!(r.get_scalar("Q Targets Std").unwrap(), 1.0);
        assert_eq!(r.get_scalar("Q Targets Max").unwrap(), 3.0);
        assert_eq!(r.get_scalar("Q Targets Min").unwrap(), 1.0);
        assert!(stats_record("empty", &[]).is_empty());
    }
}
