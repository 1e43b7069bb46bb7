use futures::FutureExt;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Allocation, Code, Error, INCR, IncrReply, REPL, ReplReply, Replenish, Result, Segment,
    SegmentCache, SegmentStore,
};

/// Default number of ids per cache window.
pub const DEFAULT_BATCH_SIZE: i64 = 1000;

/// Tunables of a [`SegmentAllocator`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Ids reserved from the store per replenishment. Requests for more than
    /// half of this bypass the cache and get a dedicated range.
    pub batch_size: i64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl AllocatorConfig {
    pub const fn with_batch_size(batch_size: i64) -> Self {
        Self { batch_size }
    }
}

/// Outcome of one INCR evaluation.
enum Incr {
    Granted(Segment),
    Exhausted(Code),
}

/// Hands out monotonic id ranges per business key.
///
/// Requests are served from a shared cache window first. When the window is
/// missing or exhausted, a new window of `batch_size` ids is reserved from
/// the durable store under its row lock and installed in the cache.
///
/// # Example
///
/// ```
/// use segflake::{AllocatorConfig, MemoryCache, MemoryStore, SegmentAllocator};
///
/// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// let allocator = SegmentAllocator::new(
///     MemoryCache::new(),
///     MemoryStore::new(),
///     AllocatorConfig::with_batch_size(100),
/// )?;
///
/// let allocation = allocator.generate_segment("k1", 17).await?;
/// assert_eq!(allocation.primary.min_id, 1);
/// assert_eq!(allocation.primary.max_id, 100);
/// assert_eq!(allocation.primary.cursor, 17);
///
/// assert_eq!(allocator.new_id("k1").await?, 18);
/// # Ok::<(), segflake::Error>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct SegmentAllocator<C, S> {
    cache: C,
    store: S,
    config: AllocatorConfig,
}

impl<C, S> SegmentAllocator<C, S>
where
    C: SegmentCache,
    S: SegmentStore,
{
    /// # Errors
    ///
    /// [`Error::BadParameter`] when `batch_size < 1`.
    pub fn new(cache: C, store: S, config: AllocatorConfig) -> Result<Self> {
        if config.batch_size < 1 {
            return Err(Error::bad_parameter(format!(
                "batch size {} must be at least 1",
                config.batch_size
            )));
        }
        Ok(Self {
            cache,
            store,
            config,
        })
    }

    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    pub const fn cache(&self) -> &C {
        &self.cache
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Reserves `num` ids for `key`.
    ///
    /// The reservation spans one segment, or two when the current cache
    /// window ends inside it.
    ///
    /// # Errors
    ///
    /// - [`Error::BadParameter`] for an empty key or `num < 1`
    /// - [`Error::StaleBounds`] when a concurrent replenishment already
    ///   installed a later window; not retried
    /// - [`Error::Uninitialized`] / [`Error::Overflow`] when the window is
    ///   still unusable after one replenishment
    /// - [`Error::Unknown`] for a reply outside the script protocol
    /// - [`Error::Cache`] / [`Error::Store`] from the bindings, unchanged
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub async fn generate_segment(&self, key: &str, num: u64) -> Result<Allocation> {
        if key.is_empty() {
            return Err(Error::bad_parameter("key must not be empty"));
        }
        let num = i64::try_from(num)
            .ok()
            .filter(|num| *num >= 1)
            .ok_or_else(|| Error::bad_parameter(format!("cannot allocate {num} ids")))?;

        if num > self.config.batch_size / 2 {
            return Ok(Allocation::single(self.dedicated(key, num).await?));
        }

        let primary = self.cached(key, num).await?;
        let granted = segment_len(&primary);
        if granted >= num {
            return Ok(Allocation::single(primary));
        }

        let remainder = num - granted;
        #[cfg(feature = "tracing")]
        tracing::debug!(granted, remainder, "window boundary inside request");
        let mut supplemental = self.cached(key, remainder).await?;
        if segment_len(&supplemental) < remainder {
            // Drained by a concurrent caller; the partial ids are abandoned.
            #[cfg(feature = "tracing")]
            tracing::warn!(remainder, "supplemental window came up short");
            supplemental = self.dedicated(key, remainder).await?;
        }

        Ok(Allocation {
            primary,
            supplemental: Some(supplemental),
        })
    }

    /// Reserves a single id for `key`.
    ///
    /// # Errors
    ///
    /// See [`Self::generate_segment`].
    pub async fn new_id(&self, key: &str) -> Result<i64> {
        Ok(self.generate_segment(key, 1).await?.primary.min_id)
    }

    /// Reserves `count` ids for `key` and passes each to `iterate`, in order.
    ///
    /// The reservation is made up front and consumed by this call; ids are
    /// never handed out twice even if `iterate` stops early by panicking.
    ///
    /// # Errors
    ///
    /// See [`Self::generate_segment`]. `iterate` is not called on error.
    pub async fn new_id_iterate<F>(&self, key: &str, count: u64, mut iterate: F) -> Result<()>
    where
        F: FnMut(i64),
    {
        let allocation = self.generate_segment(key, count).await?;
        for id in allocation {
            iterate(id);
        }
        Ok(())
    }

    async fn dedicated(&self, key: &str, num: i64) -> Result<Segment> {
        #[cfg(feature = "tracing")]
        tracing::debug!(num, "bypassing cache window");
        let range = self.store.block_next_segment(key, num).await?;
        Ok(Segment::new(Code::Success, range.start, range.end, range.end))
    }

    /// Up to `num` ids from the cache window, replenishing it at most once.
    async fn cached(&self, key: &str, num: i64) -> Result<Segment> {
        if let Incr::Granted(segment) = self.incr(key, num).await? {
            return Ok(segment);
        }

        let probe = self.probe(key, num).boxed();
        let replenish: futures::future::BoxFuture<'_, Result<Replenish<Segment>>> = self
            .store
            .block_next_segment_with(key, self.config.batch_size, probe)
            .boxed();
        let range = match replenish.await? {
            Replenish::ShortCircuit(segment) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("window already replenished by a concurrent caller");
                return Ok(segment);
            }
            Replenish::Reserved(range) => range,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(start = range.start, end = range.end, "installing window");
        self.repl(key, range.start - 1, range.end).await?;

        match self.incr(key, num).await? {
            Incr::Granted(segment) => Ok(segment),
            Incr::Exhausted(Code::Uninitialized) => Err(Error::Uninitialized),
            Incr::Exhausted(_) => Err(Error::Overflow),
        }
    }

    /// INCR under the store row lock; `Some` means no replenishment is needed.
    async fn probe(&self, key: &str, num: i64) -> Result<Option<Segment>> {
        match self.incr(key, num).await? {
            Incr::Granted(segment) => Ok(Some(segment)),
            Incr::Exhausted(_) => Ok(None),
        }
    }

    async fn incr(&self, key: &str, num: i64) -> Result<Incr> {
        let raw = self.cache.eval(&INCR, &[key], &[num]).await?;
        let reply = IncrReply::parse(&raw)?;
        match reply.code {
            Code::Success => match reply.prev.checked_add(1) {
                Some(min_id) => Ok(Incr::Granted(Segment::new(
                    Code::Success,
                    min_id,
                    reply.max,
                    reply.cur,
                ))),
                None => Err(Error::Unknown { reply: raw }),
            },
            code @ (Code::Uninitialized | Code::Overflow) => Ok(Incr::Exhausted(code)),
            Code::BadParameter => Err(Error::bad_parameter(format!(
                "cache rejected INCR {num} for {key:?}"
            ))),
            Code::StaleBounds | Code::Unknown => Err(Error::Unknown { reply: raw }),
        }
    }

    async fn repl(&self, key: &str, lower: i64, upper: i64) -> Result<()> {
        let raw = self.cache.eval(&REPL, &[key], &[lower, upper]).await?;
        let reply = ReplReply::parse(&raw)?;
        match reply.code {
            Code::Success => Ok(()),
            Code::StaleBounds => {
                #[cfg(feature = "tracing")]
                tracing::warn!(key, lower, upper, "cache holds a later window");
                Err(Error::StaleBounds {
                    key: key.to_owned(),
                    lower,
                    upper,
                })
            }
            Code::BadParameter => Err(Error::bad_parameter(format!(
                "cache rejected window ({lower}, {upper}] for {key:?}"
            ))),
            Code::Uninitialized | Code::Overflow | Code::Unknown => {
                Err(Error::Unknown { reply: raw })
            }
        }
    }
}

fn segment_len(segment: &Segment) -> i64 {
    i64::try_from(segment.len()).unwrap_or(i64::MAX)
}
