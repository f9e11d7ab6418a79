use std::io::BufRead;

use super::decoder::{PREALLOCATED_RECORDS, StreamDecoder};
use super::normalize::Normalizer;
use super::{ContainerInfo, Error, Result};
use crate::container::ContainerID;
use crate::netns::{InterfaceResolver, NetworkEnricher};

/// Collects a fixed number of enriched snapshots for a single container.
///
/// `Accumulator` holds no per-collection state, so one instance can serve any number of
/// concurrent collections on independent streams.
#[derive(Debug, Clone, Default)]
pub struct Accumulator<R> {
    normalizer: Normalizer,
    enricher: NetworkEnricher<R>,
}

impl<R: InterfaceResolver> Accumulator<R> {
    pub fn new(normalizer: Normalizer, resolver: R) -> Self {
        Self {
            normalizer,
            enricher: NetworkEnricher::new(resolver),
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Reads `count` stats records from `reader` and returns them as a series for `id`.
    ///
    /// Each record is decoded, normalized and enriched with the interface counters of the
    /// network namespace of `pid` before the next record is read. Failing to resolve the
    /// namespace does not fail the collection; the affected snapshots simply carry no
    /// interfaces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSampleCount`] if `count` is zero,
    /// [`Error::InvalidContainerID`] if `id` is not a valid container id, and the
    /// stream error of the first record that could not be read or decoded. No series is
    /// returned in any of these cases.
    pub fn collect<B: BufRead>(
        &self,
        reader: B,
        count: usize,
        id: impl AsRef<str>,
        pid: u32,
    ) -> Result<ContainerInfo> {
        if count == 0 {
            return Err(Error::InvalidSampleCount(count));
        }
        let id = ContainerID::new(id)?;

        let mut decoder = StreamDecoder::new(reader);
        let mut stats = Vec::with_capacity(count.min(PREALLOCATED_RECORDS));
        for _ in 0..count {
            let raw = decoder.read_record()?;
            let mut snapshot = self.normalizer.normalize(&raw);
            self.enricher.apply(&mut snapshot, pid);
            stats.push(snapshot);
        }

        log::trace!("collected {} stats samples for container {}", stats.len(), id);
        Ok(ContainerInfo::new(id, stats))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::netns::ProcfsResolver;
    use crate::netns::testing::{FailingResolver, FakeResolver, interface};
    use crate::stats::{BlkioGrouping, InterfaceStats, NormalizerConfig, UserTimeSource};

    fn record(second: u32, total_usage: u64) -> String {
        format!(
            r#"{{"read":"2024-05-01T10:00:{second:02}Z","cpu_stats":{{"cpu_usage":{{"total_usage":{total_usage},"usage_in_kernelmode":20,"usage_in_usermode":30}}}},"memory_stats":{{"usage":4096}},"blkio_stats":{{"io_service_bytes_recursive":[{{"major":8,"minor":0,"op":"Read","value":100}},{{"major":8,"minor":0,"op":"Write","value":50}}]}}}}"#
        ) + "\n"
    }

    fn stream(n: u32) -> String {
        (0..n).map(|i| record(i, 100 * u64::from(i))).collect()
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_accumulator_is_send_sync() {
        assert_send_sync::<Accumulator<ProcfsResolver>>();
        assert_send_sync::<Accumulator<FailingResolver>>();
    }

    /// Reports a single interface whose counters are derived from the pid.
    struct PidResolver;

    impl InterfaceResolver for PidResolver {
        fn resolve_interfaces(&self, pid: u32) -> BTreeMap<String, InterfaceStats> {
            let stats = interface("eth0", u64::from(pid), u64::from(pid) * 2);
            BTreeMap::from([(stats.name.clone(), stats)])
        }
    }

    #[test]
    fn test_concurrent_collections_are_independent() {
        let accumulator = Accumulator::new(Normalizer::default(), PidResolver);

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (1..=4u32)
                .map(|n| {
                    let accumulator = &accumulator;
                    s.spawn(move || {
                        let data: String = (0..n)
                            .map(|i| record(i, 1000 * u64::from(n) + u64::from(i)))
                            .collect();
                        let id = format!("container-{n}");
                        accumulator.collect(data.as_bytes(), n as usize, id, 100 + n)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (n, result) in (1..=4u32).zip(results) {
            let series = result.unwrap();
            assert_eq!(series.id().as_ref(), format!("container-{n}"));
            assert_eq!(series.len(), n as usize);
            for (i, stats) in series.stats().iter().enumerate() {
                assert_eq!(stats.cpu.usage.total, 1000 * u64::from(n) + i as u64);
                assert_eq!(
                    stats.network.interfaces,
                    vec![interface("eth0", u64::from(100 + n), u64::from(100 + n) * 2)]
                );
            }
        }
    }

    #[test]
    fn test_collect_with_failing_enrichment() {
        let accumulator = Accumulator::new(Normalizer::default(), FailingResolver);
        let data = stream(5);
        let series = accumulator.collect(data.as_bytes(), 5, "abc", 1).unwrap();

        assert_eq!(series.id().as_ref(), "abc");
        assert_eq!(series.len(), 5);
        for stats in series.stats() {
            assert!(stats.network.interfaces.is_empty());
        }
    }

    #[test]
    fn test_collect_preserves_read_order() {
        let accumulator = Accumulator::new(Normalizer::default(), FailingResolver);
        let data = stream(4);
        let series = accumulator.collect(data.as_bytes(), 4, "abc", 1).unwrap();

        let totals: Vec<_> = series.stats().iter().map(|s| s.cpu.usage.total).collect();
        assert_eq!(totals, [0, 100, 200, 300]);
        assert!(
            series
                .stats()
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp)
        );
    }

    #[test]
    fn test_collect_reads_only_requested_records() {
        let accumulator = Accumulator::new(Normalizer::default(), FailingResolver);
        let data = stream(3) + "{not json\n";
        let series = accumulator.collect(data.as_bytes(), 3, "abc", 1).unwrap();
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_collect_malformed_record_yields_no_series() {
        let accumulator = Accumulator::new(Normalizer::default(), FailingResolver);
        for k in 1..=4u32 {
            let data: String = (1..=4u32)
                .map(|i| {
                    if i == k {
                        "{\"read\": 17}\n".to_owned()
                    } else {
                        record(i, 1)
                    }
                })
                .collect();
            match accumulator.collect(data.as_bytes(), 4, "abc", 1).unwrap_err() {
                Error::Decode { index, .. } => assert_eq!(index, (k - 1) as usize),
                err => panic!("expected Decode, got {err:?}"),
            }
        }
    }

    #[test]
    fn test_collect_short_stream_yields_no_series() {
        let accumulator = Accumulator::new(Normalizer::default(), FailingResolver);
        let data = stream(2);
        assert!(matches!(
            accumulator.collect(data.as_bytes(), 3, "abc", 1).unwrap_err(),
            Error::UnexpectedEof { index: 2 }
        ));
    }

    #[test]
    fn test_collect_huge_count_on_empty_stream() {
        let accumulator = Accumulator::new(Normalizer::default(), FailingResolver);
        assert!(matches!(
            accumulator.collect(&b""[..], 1 << 40, "abc", 1).unwrap_err(),
            Error::UnexpectedEof { index: 0 }
        ));
    }

    #[test]
    fn test_collect_rejects_invalid_configuration() {
        let accumulator = Accumulator::new(Normalizer::default(), FailingResolver);
        let data = stream(1);

        let err = accumulator.collect(data.as_bytes(), 0, "abc", 1).unwrap_err();
        assert!(matches!(err, Error::InvalidSampleCount(0)));
        assert!(err.is_configuration_fault());

        let err = accumulator.collect(data.as_bytes(), 1, "", 1).unwrap_err();
        assert!(matches!(err, Error::InvalidContainerID(_)));
        assert!(err.is_configuration_fault());
    }

    #[test]
    fn test_collect_enriches_every_sample_with_pid() {
        let resolver = FakeResolver::new(vec![
            interface("lo", 1, 1),
            interface("eth0", 10, 20),
        ]);
        let accumulator = Accumulator::new(Normalizer::default(), &resolver);
        let data = stream(3);
        let series = accumulator.collect(data.as_bytes(), 3, "abc", 4242).unwrap();

        assert_eq!(*resolver.calls.borrow(), [4242, 4242, 4242]);
        for stats in series.stats() {
            assert_eq!(stats.network.interfaces, vec![interface("eth0", 10, 20)]);
        }
    }

    #[test]
    fn test_collect_applies_normalizer_config() {
        let normalizer = Normalizer::new(NormalizerConfig {
            user_time: UserTimeSource::UserMode,
            blkio: BlkioGrouping::MergeByDevice,
        });
        let accumulator = Accumulator::new(normalizer, FailingResolver);
        let data = stream(1);
        let series = accumulator.collect(data.as_bytes(), 1, "abc", 1).unwrap();

        let stats = &series.stats()[0];
        assert_eq!(stats.cpu.usage.user, 30);
        assert_eq!(stats.cpu.usage.system, 20);
        assert_eq!(stats.diskio.io_service_bytes.len(), 1);
        assert_eq!(stats.diskio.io_service_bytes[0].stats.len(), 2);
    }

    #[test]
    fn test_collect_default_mapping() {
        let accumulator = Accumulator::new(Normalizer::default(), FailingResolver);
        let data = stream(1);
        let series = accumulator.collect(data.as_bytes(), 1, "abc", 1).unwrap();

        let stats = &series.stats()[0];
        assert_eq!(stats.cpu.usage.user, 20);
        assert_eq!(stats.cpu.usage.system, 20);
        assert_eq!(stats.memory.usage, 4096);
        assert_eq!(stats.diskio.io_service_bytes.len(), 2);
    }
}
