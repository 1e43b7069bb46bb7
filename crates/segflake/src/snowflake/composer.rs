use core::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    CUSTOM_EPOCH, Error, Fields, GeneFunc, Layout, Mutex, NumericGene, Result, SystemClock,
    TimeSource, mutex::lock,
};

const MIN_TIME_UNIT: Duration = Duration::from_millis(1);

struct State {
    /// `None` until the first ID is issued.
    last_elapsed: Option<u64>,
    sequence: u64,
}

/// A mutex-guarded composite ID generator.
///
/// Every ID packs, from MSB to LSB, the elapsed time units since the epoch,
/// a reserved clock field, a per-unit sequence, this composer's machine id
/// and a gene derived from the caller's key (see [`Layout`]).
///
/// The internal mutex is the only serialization point: it orders sequence
/// allocation within the process and nothing else. Uniqueness across
/// processes relies on each process holding a distinct machine id, usually
/// claimed through a [`MachineRegistry`](crate::MachineRegistry).
///
/// When the sequence wraps inside one time unit the composer advances to the
/// next unit and blocks (through [`TimeSource::sleep`]) until that unit
/// arrives, instead of reusing an ID.
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ Pluggable clock and gene function
/// - ✅ Fails closed on any out-of-range field
///
/// # Example
///
/// ```
/// use segflake::SnowflakeComposer;
///
/// let composer = SnowflakeComposer::builder().machine_id(3).build()?;
/// let a = composer.next_id(Some("1001"))?;
/// let b = composer.next_id(Some("1001"))?;
/// assert!(a < b);
/// assert_eq!(composer.decompose(a).machine, 3);
/// # Ok::<(), segflake::Error>(())
/// ```
pub struct SnowflakeComposer<T = SystemClock, G = NumericGene>
where
    T: TimeSource,
    G: GeneFunc,
{
    layout: Layout,
    epoch: Duration,
    unit: Duration,
    machine_id: u64,
    gene: G,
    time: T,
    state: Mutex<State>,
}

enum MachineSource {
    Fixed(u64),
    Supplier(Box<dyn FnOnce() -> Result<u64>>),
}

/// Configuration for a [`SnowflakeComposer`].
///
/// Every tunable has a default: the 41/1/10/7/4 layout, a 1ms time unit,
/// [`CUSTOM_EPOCH`], machine id `0`, [`NumericGene`] and [`SystemClock`].
/// All validation happens in [`SnowflakeBuilder::build`].
pub struct SnowflakeBuilder<T = SystemClock, G = NumericGene> {
    widths: Option<[u32; 5]>,
    epoch: Duration,
    unit: Duration,
    machine: MachineSource,
    gene: G,
    time: T,
}

impl Default for SnowflakeBuilder {
    fn default() -> Self {
        Self {
            widths: None,
            epoch: CUSTOM_EPOCH,
            unit: MIN_TIME_UNIT,
            machine: MachineSource::Fixed(0),
            gene: NumericGene,
            time: SystemClock,
        }
    }
}

impl<T, G> SnowflakeBuilder<T, G>
where
    T: TimeSource,
    G: GeneFunc,
{
    /// Field widths for time, clock, sequence, machine and gene.
    #[must_use]
    pub fn layout(
        mut self,
        time: u32,
        clock: u32,
        sequence: u32,
        machine: u32,
        gene: u32,
    ) -> Self {
        self.widths = Some([time, clock, sequence, machine, gene]);
        self
    }

    /// The instant (since 1970-01-01 UTC) time units are counted from.
    #[must_use]
    pub fn epoch(mut self, epoch: Duration) -> Self {
        self.epoch = epoch;
        self
    }

    /// Granularity of the time field. Must be at least 1ms.
    #[must_use]
    pub fn time_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    #[must_use]
    pub fn machine_id(mut self, machine_id: u64) -> Self {
        self.machine = MachineSource::Fixed(machine_id);
        self
    }

    /// Resolves the machine id lazily, once, during [`Self::build`].
    #[must_use]
    pub fn machine_id_with(mut self, supplier: impl FnOnce() -> Result<u64> + 'static) -> Self {
        self.machine = MachineSource::Supplier(Box::new(supplier));
        self
    }

    #[must_use]
    pub fn gene_func<G2: GeneFunc>(self, gene: G2) -> SnowflakeBuilder<T, G2> {
        SnowflakeBuilder {
            widths: self.widths,
            epoch: self.epoch,
            unit: self.unit,
            machine: self.machine,
            gene,
            time: self.time,
        }
    }

    #[must_use]
    pub fn time_source<T2: TimeSource>(self, time: T2) -> SnowflakeBuilder<T2, G> {
        SnowflakeBuilder {
            widths: self.widths,
            epoch: self.epoch,
            unit: self.unit,
            machine: self.machine,
            gene: self.gene,
            time,
        }
    }

    /// Validates the configuration and creates the composer.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFieldWidth`] for a layout that does not sum to 63 or
    ///   whose sequence/machine width lies outside `[0, 16]`
    /// - [`Error::InvalidTimeUnit`] for a time unit below 1ms
    /// - [`Error::StartTimeAhead`] when the epoch is after the current time
    /// - [`Error::InvalidMachineId`] when the machine id does not fit
    /// - any error returned by a machine id supplier
    pub fn build(self) -> Result<SnowflakeComposer<T, G>> {
        let layout = match self.widths {
            Some([time, clock, sequence, machine, gene]) => {
                Layout::new(time, clock, sequence, machine, gene)?
            }
            None => Layout::default(),
        };
        if self.unit < MIN_TIME_UNIT {
            return Err(Error::InvalidTimeUnit);
        }
        if self.epoch > self.time.now() {
            return Err(Error::StartTimeAhead);
        }
        let machine_id = match self.machine {
            MachineSource::Fixed(id) => id,
            MachineSource::Supplier(supplier) => supplier()?,
        };
        layout.check_machine_id(machine_id)?;

        Ok(SnowflakeComposer {
            layout,
            epoch: self.epoch,
            unit: self.unit,
            machine_id,
            gene: self.gene,
            time: self.time,
            state: Mutex::new(State {
                last_elapsed: None,
                sequence: 0,
            }),
        })
    }
}

impl SnowflakeComposer {
    /// Starts configuring a composer with the default layout, epoch, clock
    /// and gene function.
    pub fn builder() -> SnowflakeBuilder {
        SnowflakeBuilder::default()
    }
}

impl<T, G> SnowflakeComposer<T, G>
where
    T: TimeSource,
    G: GeneFunc,
{
    /// Generates the next composite ID for `key`.
    ///
    /// `key` only feeds the gene function; `None` is a valid key.
    ///
    /// This call may block for up to one time unit when the sequence for the
    /// current unit is exhausted.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidGene`] if the gene function returns a value outside
    ///   the gene field
    /// - [`Error::TimeLimitExceeded`] once elapsed time no longer fits the
    ///   time field
    /// - [`Error::LockPoisoned`] if another thread panicked mid-generation
    ///   (without the `parking-lot` feature)
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_id(&self, key: Option<&str>) -> Result<i64> {
        let gene = self.gene.gene(key, self.layout.gene_modulus());
        if gene > self.layout.max_gene() {
            return Err(Error::InvalidGene);
        }

        let mut state = lock(&self.state)?;
        let current = self.elapsed(self.time.now());
        let elapsed = match state.last_elapsed {
            Some(last) if current <= last => {
                state.sequence = (state.sequence + 1) & self.layout.max_sequence();
                if state.sequence == 0 {
                    let next = last.saturating_add(1);
                    self.wait_for(next);
                    next
                } else {
                    last
                }
            }
            _ => {
                state.sequence = 0;
                current
            }
        };
        state.last_elapsed = Some(elapsed);

        if elapsed > self.layout.max_time() {
            return Err(Error::TimeLimitExceeded);
        }
        Ok(self
            .layout
            .pack(elapsed, state.sequence, self.machine_id, gene))
    }

    /// Builds an ID from explicit components using this composer's layout.
    ///
    /// # Errors
    ///
    /// See [`Layout::compose`].
    pub fn compose(&self, time: u64, sequence: u64, machine: u64, gene: u64) -> Result<i64> {
        self.layout.compose(time, sequence, machine, gene)
    }

    /// Splits an ID into its fields. Pure; does not touch generator state.
    pub fn decompose(&self, id: i64) -> Fields {
        self.layout.decompose(id)
    }

    /// The wall-clock instant (since 1970-01-01 UTC) at the start of the time
    /// unit encoded in `id`.
    pub fn timestamp(&self, id: i64) -> Duration {
        self.epoch
            .saturating_add(units_to_duration(self.unit, self.decompose(id).time))
    }

    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    pub const fn machine_id(&self) -> u64 {
        self.machine_id
    }

    pub const fn epoch(&self) -> Duration {
        self.epoch
    }

    pub const fn time_unit(&self) -> Duration {
        self.unit
    }

    fn elapsed(&self, now: Duration) -> u64 {
        now.checked_sub(self.epoch).map_or(0, |since| {
            u64::try_from(since.as_nanos() / self.unit.as_nanos()).unwrap_or(u64::MAX)
        })
    }

    /// Blocks until the clock reaches time unit `target`.
    #[cold]
    #[inline(never)]
    fn wait_for(&self, target: u64) {
        let due = self
            .epoch
            .saturating_add(units_to_duration(self.unit, target));
        loop {
            let now = self.time.now();
            if self.elapsed(now) >= target {
                break;
            }
            let remaining = due.saturating_sub(now);
            #[cfg(feature = "tracing")]
            tracing::debug!(
                unit = target,
                ?remaining,
                "sequence exhausted, waiting for next time unit"
            );
            self.time.sleep(remaining);
        }
    }
}

fn units_to_duration(unit: Duration, units: u64) -> Duration {
    let nanos = unit.as_nanos().saturating_mul(u128::from(units));
    let secs = u64::try_from(nanos / 1_000_000_000).unwrap_or(u64::MAX);
    // Always below 1e9
    let subsec = (nanos % 1_000_000_000) as u32;
    Duration::new(secs, subsec)
}
