use crate::{
    Error, Fields, Fnv1aGene, Layout, SnowflakeComposer, SystemClock, TimeSource,
};
use core::time::Duration;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::scope;

/// 2021-03-04T05:06:07Z
const EPOCH: Duration = Duration::from_secs(1_614_834_367);

/// Mock clock in nanoseconds that only moves when told to, or when a
/// composer sleeps on it.
#[derive(Default)]
struct MockTime {
    nanos: AtomicU64,
    sleeps: AtomicUsize,
}

impl MockTime {
    fn at(now: Duration) -> Arc<Self> {
        let time = Arc::new(Self::default());
        time.set(now);
        time
    }

    fn set(&self, now: Duration) {
        self.nanos
            .store(u64::try_from(now.as_nanos()).unwrap(), Ordering::SeqCst);
    }

    fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl TimeSource for MockTime {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, dur: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.nanos
            .fetch_add(u64::try_from(dur.as_nanos()).unwrap(), Ordering::SeqCst);
    }
}

fn composer_at(
    time: &Arc<MockTime>,
    widths: [u32; 5],
    machine_id: u64,
) -> SnowflakeComposer<Arc<MockTime>> {
    let [t, c, s, m, g] = widths;
    SnowflakeComposer::builder()
        .layout(t, c, s, m, g)
        .epoch(EPOCH)
        .machine_id(machine_id)
        .time_source(Arc::clone(time))
        .build()
        .unwrap()
}

#[test]
fn layout_default_is_valid() {
    let layout = Layout::default();
    assert_eq!(
        Layout::new(41, 1, 10, 7, 4).unwrap(),
        layout,
        "default layout must pass validation"
    );
    assert_eq!(layout.time_bits(), 41);
    assert_eq!(layout.clock_bits(), 1);
    assert_eq!(layout.sequence_bits(), 10);
    assert_eq!(layout.machine_bits(), 7);
    assert_eq!(layout.gene_bits(), 4);
    assert_eq!(layout.max_sequence(), 1023);
    assert_eq!(layout.max_machine(), 127);
    assert_eq!(layout.gene_modulus(), 16);
}

#[test]
fn ids_within_one_unit_differ_only_in_sequence() {
    let time = MockTime::at(EPOCH + Duration::from_millis(5_000));
    let composer = composer_at(&time, [41, 1, 10, 7, 4], 111);

    let ids: Vec<i64> = (0..10).map(|_| composer.next_id(None).unwrap()).collect();

    for (i, window) in ids.windows(2).enumerate() {
        assert!(window[0] < window[1], "id {i} not below its successor");
    }
    for (i, &id) in ids.iter().enumerate() {
        assert_eq!(
            composer.decompose(id),
            Fields {
                time: 5_000,
                clock: 0,
                sequence: i as u64,
                machine: 111,
                gene: 0,
            }
        );
        // sequence sits above machine (7) and gene (4)
        assert_eq!(id - ids[0], (i as i64) << 11);
    }
}

#[test]
fn new_time_unit_resets_sequence() {
    let time = MockTime::at(EPOCH + Duration::from_millis(10));
    let composer = composer_at(&time, [41, 1, 10, 7, 4], 1);

    composer.next_id(None).unwrap();
    composer.next_id(None).unwrap();
    time.set(EPOCH + Duration::from_millis(11));
    let fields = composer.decompose(composer.next_id(None).unwrap());
    assert_eq!(fields.time, 11);
    assert_eq!(fields.sequence, 0);
}

#[test]
fn first_id_at_the_epoch_starts_at_sequence_zero() {
    let time = MockTime::at(EPOCH);
    let composer = composer_at(&time, [41, 1, 10, 7, 4], 1);

    let first = composer.decompose(composer.next_id(None).unwrap());
    assert_eq!((first.time, first.sequence), (0, 0));
    let second = composer.decompose(composer.next_id(None).unwrap());
    assert_eq!((second.time, second.sequence), (0, 1));
    assert_eq!(time.sleeps(), 0);
}

#[test]
fn sequence_exhaustion_waits_for_next_unit() {
    let time = MockTime::at(EPOCH + Duration::from_millis(42));
    // 2-bit sequence: four ids per millisecond
    let composer = composer_at(&time, [43, 1, 2, 13, 4], 5);

    let mut seen = HashSet::new();
    for sequence in 0..4 {
        let id = composer.next_id(None).unwrap();
        assert!(seen.insert(id));
        let fields = composer.decompose(id);
        assert_eq!((fields.time, fields.sequence), (42, sequence));
    }
    assert_eq!(time.sleeps(), 0);

    let id = composer.next_id(None).unwrap();
    assert!(seen.insert(id));
    let fields = composer.decompose(id);
    assert_eq!((fields.time, fields.sequence), (43, 0));
    assert!(time.sleeps() >= 1);
    assert!(time.now() >= EPOCH + Duration::from_millis(43));
}

#[test]
fn more_ids_than_sequence_space_stay_unique() {
    let time = MockTime::at(EPOCH);
    let composer = composer_at(&time, [41, 1, 10, 7, 4], 0);

    let mut seen = HashSet::new();
    let mut last = -1;
    for _ in 0..5_000 {
        let id = composer.next_id(Some("7")).unwrap();
        assert!(id > last);
        assert!(seen.insert(id));
        last = id;
    }
    // 5000 ids over 1024 per unit need at least four forward waits
    assert!(time.sleeps() >= 4);
}

#[test]
fn clock_regression_keeps_last_unit() {
    let time = MockTime::at(EPOCH + Duration::from_millis(100));
    let composer = composer_at(&time, [41, 1, 10, 7, 4], 3);

    let first = composer.next_id(None).unwrap();
    time.set(EPOCH + Duration::from_millis(90));
    let second = composer.next_id(None).unwrap();

    assert!(second > first);
    let fields = composer.decompose(second);
    assert_eq!((fields.time, fields.sequence), (100, 1));
}

#[test]
fn gene_comes_from_the_key() {
    let time = MockTime::at(EPOCH + Duration::from_millis(1));
    let composer = composer_at(&time, [41, 1, 10, 7, 4], 9);

    let id = composer.next_id(Some("12345")).unwrap();
    assert_eq!(composer.decompose(id).gene, 9);
    let id = composer.next_id(Some("user-abc")).unwrap();
    assert_eq!(composer.decompose(id).gene, 0);

    let hashed = SnowflakeComposer::builder()
        .epoch(EPOCH)
        .gene_func(Fnv1aGene)
        .time_source(Arc::clone(&time))
        .build()
        .unwrap();
    let a = hashed.decompose(hashed.next_id(Some("user-abc")).unwrap()).gene;
    let b = hashed.decompose(hashed.next_id(Some("user-abc")).unwrap()).gene;
    assert_eq!(a, b);
    assert!(a < 16);
}

#[test]
fn out_of_range_gene_is_rejected() {
    let composer = SnowflakeComposer::builder()
        .epoch(EPOCH)
        .gene_func(|_key: Option<&str>, modulus: u64| modulus)
        .build()
        .unwrap();
    assert!(matches!(composer.next_id(None), Err(Error::InvalidGene)));
}

#[test]
fn time_limit_exceeded_once_time_field_is_full() {
    let time = MockTime::at(EPOCH + Duration::from_millis(1_023));
    let composer = composer_at(&time, [10, 1, 10, 7, 35], 0);

    assert_eq!(composer.decompose(composer.next_id(None).unwrap()).time, 1_023);
    time.set(EPOCH + Duration::from_millis(1_024));
    assert!(matches!(
        composer.next_id(None),
        Err(Error::TimeLimitExceeded)
    ));
}

#[test]
fn coarser_time_unit_scales_time_field() {
    let time = MockTime::at(EPOCH + Duration::from_millis(1_234));
    let composer = SnowflakeComposer::builder()
        .epoch(EPOCH)
        .time_unit(Duration::from_millis(10))
        .time_source(Arc::clone(&time))
        .build()
        .unwrap();

    let id = composer.next_id(None).unwrap();
    assert_eq!(composer.decompose(id).time, 123);
    assert_eq!(composer.timestamp(id), EPOCH + Duration::from_millis(1_230));
}

#[test]
fn timestamp_recovers_wall_clock_instant() {
    let now = EPOCH + Duration::from_millis(987_654);
    let time = MockTime::at(now);
    let composer = composer_at(&time, [41, 1, 10, 7, 4], 111);

    let id = composer.next_id(None).unwrap();
    assert_eq!(composer.timestamp(id), now);
}

#[test]
fn compose_and_decompose_agree() {
    let composer = SnowflakeComposer::builder().machine_id(2).build().unwrap();
    let layout = composer.layout();

    for (time, sequence, machine, gene) in [
        (0, 0, 0, 0),
        (1, 2, 3, 4),
        (layout.max_time(), layout.max_sequence(), layout.max_machine(), layout.max_gene()),
    ] {
        let id = composer.compose(time, sequence, machine, gene).unwrap();
        assert!(id >= 0);
        assert_eq!(
            composer.decompose(id),
            Fields {
                time,
                clock: 0,
                sequence,
                machine,
                gene,
            }
        );
    }
    assert_eq!(
        composer
            .compose(layout.max_time(), layout.max_sequence(), layout.max_machine(), layout.max_gene())
            .unwrap(),
        i64::MAX - (1 << 21)
    );
}

#[test]
fn compose_rejects_each_out_of_range_field() {
    let layout = Layout::default();
    assert!(matches!(layout.compose(1 << 41, 0, 0, 0), Err(Error::InvalidTime)));
    assert!(matches!(layout.compose(0, 1 << 10, 0, 0), Err(Error::InvalidSequence)));
    assert!(matches!(layout.compose(0, 0, 1 << 7, 0), Err(Error::InvalidMachineId)));
    assert!(matches!(layout.compose(0, 0, 0, 1 << 4), Err(Error::InvalidGene)));
}

#[test]
fn build_rejects_invalid_layouts() {
    let err = SnowflakeComposer::builder().layout(41, 1, 10, 7, 5).build();
    assert!(matches!(
        err,
        Err(Error::InvalidFieldWidth { field: "total", bits: 64 })
    ));

    let err = SnowflakeComposer::builder().layout(30, 0, 17, 7, 9).build();
    assert!(matches!(
        err,
        Err(Error::InvalidFieldWidth { field: "sequence", bits: 17 })
    ));

    let err = SnowflakeComposer::builder().layout(30, 0, 10, 17, 6).build();
    assert!(matches!(
        err,
        Err(Error::InvalidFieldWidth { field: "machine", bits: 17 })
    ));

    // zero-width sequence and machine are allowed
    assert!(SnowflakeComposer::builder().layout(59, 0, 0, 0, 4).build().is_ok());
}

#[test]
fn build_rejects_invalid_settings() {
    let err = SnowflakeComposer::builder()
        .time_unit(Duration::from_micros(500))
        .build();
    assert!(matches!(err, Err(Error::InvalidTimeUnit)));

    let now = SystemClock.now();
    let err = SnowflakeComposer::builder()
        .epoch(now + Duration::from_secs(3_600))
        .build();
    assert!(matches!(err, Err(Error::StartTimeAhead)));

    let err = SnowflakeComposer::builder().machine_id(128).build();
    assert!(matches!(err, Err(Error::InvalidMachineId)));
}

#[test]
fn machine_id_supplier_is_resolved_at_build() {
    let composer = SnowflakeComposer::builder()
        .machine_id_with(|| Ok(77))
        .build()
        .unwrap();
    assert_eq!(composer.machine_id(), 77);
    assert_eq!(composer.decompose(composer.next_id(None).unwrap()).machine, 77);

    let err = SnowflakeComposer::builder()
        .machine_id_with(|| Err(Error::bad_parameter("no slot")))
        .build();
    assert!(matches!(err, Err(Error::BadParameter { .. })));

    let err = SnowflakeComposer::builder()
        .machine_id_with(|| Ok(500))
        .build();
    assert!(matches!(err, Err(Error::InvalidMachineId)));
}

#[test]
fn describe_renders_every_visible_field() {
    let layout = Layout::default();
    let id = layout.compose(5_000, 3, 111, 9).unwrap();
    let table = layout.describe(id).to_string();

    assert!(table.starts_with("CompositeId {"));
    for label in ["time (41)", "clock (1)", "sequence (10)", "machine (7)", "gene (4)"] {
        assert!(table.contains(label), "missing {label} in\n{table}");
    }
    assert!(table.contains("0x6f"));
}

#[test]
fn threaded_ids_are_unique() {
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 4096;

    let composer = SnowflakeComposer::builder().machine_id(1).build().unwrap();
    let seen_ids = Mutex::new(HashSet::with_capacity(THREADS * IDS_PER_THREAD));

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..IDS_PER_THREAD {
                    let id = composer.next_id(None).unwrap();
                    assert!(seen_ids.lock().unwrap().insert(id));
                }
            });
        }
    });

    assert_eq!(seen_ids.into_inner().unwrap().len(), THREADS * IDS_PER_THREAD);
}
