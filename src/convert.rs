//! The conversion pipeline: units -> validator -> emitter.

use tracing::{debug, info, warn};

use crate::adapter::Adapted;
use crate::config::Placeholders;
use crate::emit::{BatchEmitter, BatchStats, Sink};
use crate::error::Result;
use crate::source::Unit;
use crate::validate::validate;

/// Progress is logged every this many units.
const PROGRESS_EVERY: u64 = 10_000;

/// Outcome of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Summary {
    /// Units read, including skipped ones.
    pub units: u64,
    /// Ranges accepted by the validator.
    pub valid: u64,
    /// Units that could not be parsed.
    pub malformed: u64,
    /// Parsed ranges the validator refused.
    pub rejected: u64,
    /// Blank, comment and short rows.
    pub skipped: u64,
    pub batches: BatchStats,
}

impl Summary {
    pub fn errors(&self) -> u64 {
        self.malformed + self.rejected
    }
}

/// Runs every unit through validation into `emitter`, then flushes it.
///
/// Malformed and rejected units are logged and counted. Only errors from
/// the source itself or fatal sink errors end the run early.
pub fn convert<I, S>(units: I, mut emitter: BatchEmitter<S>, placeholders: &Placeholders) -> Result<(S, Summary)>
where
    I: IntoIterator<Item = Result<Unit>>,
    S: Sink,
{
    let mut summary = Summary::default();

    for unit in units {
        let Unit { position, outcome } = unit?;
        summary.units += 1;

        match outcome {
            Ok(Adapted::Candidate(candidate)) => match validate(candidate, placeholders) {
                Ok(range) => {
                    summary.valid += 1;
                    emitter.push(range)?;
                }
                Err(rejection) => {
                    summary.rejected += 1;
                    warn!(line = position, %rejection, "range rejected");
                }
            },
            Ok(Adapted::Skip(skip)) => {
                summary.skipped += 1;
                debug!(line = position, ?skip, "skipped");
            }
            Err(err) => {
                summary.malformed += 1;
                warn!(line = position, error = %err, "malformed record");
            }
        }

        if summary.units % PROGRESS_EVERY == 0 {
            info!(
                units = summary.units,
                valid = summary.valid,
                errors = summary.errors(),
                "progress"
            );
        }
    }

    let (sink, batches) = emitter.finish()?;
    summary.batches = batches;
    Ok((sink, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Adapter;
    use crate::emit::Recorder;
    use crate::source::TextSource;
    use crate::{Error, Schema};
    use std::io;

    const SAMPLE: &str = "\
# ip2region sample
1.0.0.0|1.0.0.255|澳大利亚|0|0|0|0
1.0.1.0|1.0.3.255|中国|0|福建省|福州市|电信
1.0.4.0|1.0.7.255
1.0.16.0|1.0.8.0|日本|0|0|0|0
0.0.0.0|0.0.0.255|0|0|0|0|0

8.8.8.8|8.8.8.8|美国|0|0|0|Google
";

    fn run(input: &str, batch_size: usize) -> (Recorder, Summary) {
        let source = TextSource::new(input.as_bytes(), '|', Adapter::new(Schema::ip2region()));
        convert(source, BatchEmitter::new(Recorder::new(), batch_size), &Placeholders::default()).unwrap()
    }

    #[test]
    fn test_convert() {
        let (recorder, summary) = run(SAMPLE, 2);
        assert_eq!(summary.units, 8);
        assert_eq!(summary.valid, 3);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.errors(), 3);
        assert_eq!(summary.batches.batches, 2);

        let ranges: Vec<_> = recorder.ranges().collect();
        assert_eq!(
            (ranges[0].start, ranges[0].end, ranges[0].locality.as_str(), ranges[0].provider.as_str()),
            (16777216, 16777471, "澳大利亚", "unknown provider")
        );
        assert_eq!(
            (ranges[1].start, ranges[1].end, ranges[1].locality.as_str(), ranges[1].provider.as_str()),
            (16777472, 16778239, "中国 福建省 福州市", "电信")
        );
        assert_eq!(ranges[2].provider, "Google");
    }

    #[test]
    fn test_empty_input() {
        let (recorder, summary) = run("", 1000);
        assert_eq!(summary, Summary::default());
        assert!(recorder.batches.is_empty());
    }

    #[test]
    fn test_source_error_is_fatal() {
        let units = vec![
            Ok(Unit { position: 1, outcome: Ok(Adapted::Skip(crate::adapter::Skip::Blank)) }),
            Err(Error::Io(io::Error::new(io::ErrorKind::Other, "disk gone"))),
        ];
        let result = convert(units, BatchEmitter::new(Recorder::new(), 10), &Placeholders::default());
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
