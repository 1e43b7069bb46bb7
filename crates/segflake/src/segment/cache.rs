use std::{collections::HashMap, future::Future, sync::Arc};

use crate::{Code, Error, IncrReply, Mutex, ReplReply, Result, Script, ScriptKind, mutex::lock};

/// Atomic scripted evaluation against the shared counter cache.
///
/// An implementation must run each script as one indivisible step: no other
/// script on the same key interleaves with it and no partial effect is ever
/// observable. Client failures are reported as [`Error::Cache`].
///
/// Replies use the delimited format of [`IncrReply`] and [`ReplReply`].
pub trait SegmentCache: Send + Sync {
    fn eval(
        &self,
        script: &Script,
        keys: &[&str],
        args: &[i64],
    ) -> impl Future<Output = Result<String>> + Send;
}

impl<C: SegmentCache + ?Sized> SegmentCache for Arc<C> {
    fn eval(
        &self,
        script: &Script,
        keys: &[&str],
        args: &[i64],
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).eval(script, keys, args)
    }
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    cur: i64,
    max: i64,
}

/// In-process [`SegmentCache`] that runs both scripts natively.
///
/// A single mutex makes every evaluation atomic. Useful for tests and
/// single-process deployments; it shares nothing across processes.
#[derive(Debug, Default)]
pub struct MemoryCache {
    counters: Mutex<HashMap<String, Counter>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `(cur, max)` counter for `key`, if installed.
    ///
    /// # Errors
    ///
    /// [`Error::LockPoisoned`] without the `parking-lot` feature.
    pub fn counter(&self, key: &str) -> Result<Option<(i64, i64)>> {
        Ok(lock(&self.counters)?
            .get(key)
            .map(|counter| (counter.cur, counter.max)))
    }
}

impl SegmentCache for MemoryCache {
    async fn eval(&self, script: &Script, keys: &[&str], args: &[i64]) -> Result<String> {
        let [key] = keys else {
            return Err(Error::bad_parameter(format!(
                "{} takes exactly one key, got {}",
                script.name,
                keys.len()
            )));
        };
        let mut counters = lock(&self.counters)?;
        let reply = match (script.kind, args) {
            (ScriptKind::Incr, &[num]) => incr(&mut counters, key, num).encode(),
            (ScriptKind::Repl, &[lower, upper]) => repl(&mut counters, key, lower, upper).encode(),
            _ => {
                return Err(Error::bad_parameter(format!(
                    "{} got {} arguments",
                    script.name,
                    args.len()
                )));
            }
        };
        Ok(reply)
    }
}

fn incr(counters: &mut HashMap<String, Counter>, key: &str, num: i64) -> IncrReply {
    let reply = |code, prev, max, cur| IncrReply {
        code,
        prev,
        max,
        cur,
    };
    let Some(counter) = counters.get_mut(key) else {
        return reply(Code::Uninitialized, 0, 0, 0);
    };
    if num < 1 {
        return reply(Code::BadParameter, 0, 0, 0);
    }
    let prev = counter.cur;
    let step = num.min(counter.max - prev);
    if step < 1 {
        return reply(Code::Overflow, prev, counter.max, prev);
    }
    counter.cur += step;
    reply(Code::Success, prev, counter.max, counter.cur)
}

fn repl(counters: &mut HashMap<String, Counter>, key: &str, lower: i64, upper: i64) -> ReplReply {
    let reply = |code| ReplReply { code, lower, upper };
    if lower >= upper {
        return reply(Code::BadParameter);
    }
    if counters.get(key).is_some_and(|counter| counter.max > lower) {
        return reply(Code::StaleBounds);
    }
    counters.insert(
        key.to_owned(),
        Counter {
            cur: lower,
            max: upper,
        },
    );
    reply(Code::Success)
}
