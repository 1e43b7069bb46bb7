use std::{collections::HashMap, convert::Infallible, future::Future, sync::Arc};

use futures::{FutureExt, future::BoxFuture};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Error, Mutex, Result, mutex::lock};

/// An inclusive range of ids reserved from the durable store.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdRange {
    pub start: i64,
    pub end: i64,
}

impl IdRange {
    pub const fn len(&self) -> i64 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() <= 0
    }
}

/// Outcome of a probed replenishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replenish<T> {
    /// The transaction committed and reserved this range.
    Reserved(IdRange),
    /// The probe produced a result under the row lock; the transaction was
    /// rolled back and the row is unchanged.
    ShortCircuit(T),
}

/// Work run under the row lock of a replenishment, see
/// [`SegmentStore::block_next_segment_with`].
pub type Probe<'a, T> = BoxFuture<'a, Result<Option<T>>>;

/// Durable per-key counter with row-level locking.
///
/// Every integer the counter for a key ever produces is observed by exactly
/// one caller, across any number of processes. Different keys never block
/// each other. Client failures are reported as [`Error::Store`].
pub trait SegmentStore: Send + Sync {
    /// Locks (or upserts at value `0`) the row for `key`, stages
    /// `value += step` and awaits `probe` while the lock is held.
    ///
    /// - `probe` returns `Some(t)`: roll back, return
    ///   [`Replenish::ShortCircuit`].
    /// - `probe` returns `None`: commit, return the inclusive range
    ///   `[value - step + 1, value]`.
    /// - `probe` fails, or anything else fails: roll back, return the error.
    ///
    /// `probe` is not polled before the lock is taken, and is dropped
    /// unpolled on an early error.
    ///
    /// # Errors
    ///
    /// [`Error::BadParameter`] when `step < 1` or the counter would overflow,
    /// plus any probe or client error.
    fn block_next_segment_with<'a, T>(
        &'a self,
        key: &'a str,
        step: i64,
        probe: Probe<'a, T>,
    ) -> impl Future<Output = Result<Replenish<T>>> + Send + 'a
    where
        T: Send + 'a;

    /// Reserves `step` ids for `key` with no probe.
    ///
    /// # Errors
    ///
    /// See [`SegmentStore::block_next_segment_with`].
    fn block_next_segment<'a>(
        &'a self,
        key: &'a str,
        step: i64,
    ) -> impl Future<Output = Result<IdRange>> + Send + 'a {
        async move {
            let no_probe = async { Ok::<_, Error>(None::<Infallible>) }.boxed();
            match self.block_next_segment_with(key, step, no_probe).await? {
                Replenish::Reserved(range) => Ok(range),
                Replenish::ShortCircuit(never) => match never {},
            }
        }
    }
}

impl<S: SegmentStore + ?Sized> SegmentStore for Arc<S> {
    fn block_next_segment_with<'a, T>(
        &'a self,
        key: &'a str,
        step: i64,
        probe: Probe<'a, T>,
    ) -> impl Future<Output = Result<Replenish<T>>> + Send + 'a
    where
        T: Send + 'a,
    {
        (**self).block_next_segment_with(key, step, probe)
    }
}

#[derive(Debug)]
struct Row {
    value: i64,
    biz_id: String,
}

type RowLock = Arc<tokio::sync::Mutex<Row>>;

/// In-process [`SegmentStore`].
///
/// Each row has its own async mutex, held across the probe exactly like a
/// `SELECT ... FOR UPDATE` row lock. The row table itself sits behind a
/// short-lived [`Mutex`] that is never held across an await.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, RowLock>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the row for `key` at setup time. Returns `false`, leaving the
    /// row untouched, if it already exists.
    ///
    /// # Errors
    ///
    /// [`Error::BadParameter`] for a negative `value`, or
    /// [`Error::LockPoisoned`] without the `parking-lot` feature.
    pub fn create_row(&self, key: &str, value: i64, biz_id: impl Into<String>) -> Result<bool> {
        if value < 0 {
            return Err(Error::bad_parameter(format!(
                "initial value {value} for {key:?} is negative"
            )));
        }
        let mut rows = lock(&self.rows)?;
        if rows.contains_key(key) {
            return Ok(false);
        }
        rows.insert(
            key.to_owned(),
            Arc::new(tokio::sync::Mutex::new(Row {
                value,
                biz_id: biz_id.into(),
            })),
        );
        Ok(true)
    }

    /// The committed value of `key`, waiting for any in-flight transaction.
    ///
    /// # Errors
    ///
    /// [`Error::LockPoisoned`] without the `parking-lot` feature.
    pub async fn value(&self, key: &str) -> Result<Option<i64>> {
        let row = lock(&self.rows)?.get(key).cloned();
        match row {
            Some(row) => Ok(Some(row.lock().await.value)),
            None => Ok(None),
        }
    }

    /// The business id recorded for `key`.
    ///
    /// # Errors
    ///
    /// [`Error::LockPoisoned`] without the `parking-lot` feature.
    pub async fn biz_id(&self, key: &str) -> Result<Option<String>> {
        let row = lock(&self.rows)?.get(key).cloned();
        match row {
            Some(row) => Ok(Some(row.lock().await.biz_id.clone())),
            None => Ok(None),
        }
    }

    fn row(&self, key: &str) -> Result<RowLock> {
        let mut rows = lock(&self.rows)?;
        let row = rows.entry(key.to_owned()).or_insert_with(|| {
            #[cfg(feature = "tracing")]
            tracing::debug!(key, "upserting counter row");
            Arc::new(tokio::sync::Mutex::new(Row {
                value: 0,
                biz_id: key.to_owned(),
            }))
        });
        Ok(Arc::clone(row))
    }
}

impl SegmentStore for MemoryStore {
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, probe)))]
    async fn block_next_segment_with<'a, T>(
        &'a self,
        key: &'a str,
        step: i64,
        probe: Probe<'a, T>,
    ) -> Result<Replenish<T>>
    where
        T: Send + 'a,
    {
        if step < 1 {
            return Err(Error::bad_parameter(format!("step {step} must be at least 1")));
        }
        let handle = self.row(key)?;
        let mut row = handle.lock().await;
        let value = row.value.checked_add(step).ok_or_else(|| {
            Error::bad_parameter(format!("counter for {key:?} would overflow"))
        })?;

        if let Some(found) = probe.await? {
            return Ok(Replenish::ShortCircuit(found));
        }

        row.value = value;
        Ok(Replenish::Reserved(IdRange {
            start: value - step + 1,
            end: value,
        }))
    }
}
