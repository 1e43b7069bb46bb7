use crate::{Code, Error, Result};

/// Which atomic counter operation a [`Script`] performs.
///
/// Bindings that cannot run Lua evaluate scripts natively by matching on
/// this, see [`MemoryCache`](crate::MemoryCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// `keys = [key]`, `args = [num]`, replies `code|prev|max|cur`.
    Incr,
    /// `keys = [key]`, `args = [lower, upper]`, replies `code|lower|upper`.
    Repl,
}

/// A server-side counter script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Script {
    pub name: &'static str,
    pub kind: ScriptKind,
    /// Lua source for Redis-compatible `EVAL`.
    pub source: &'static str,
}

/// Takes up to `num` ids from the window of `KEYS[1]`.
pub const INCR: Script = Script {
    name: "segment_incr",
    kind: ScriptKind::Incr,
    source: r"
local key = KEYS[1]
local num = tonumber(ARGV[1])
if redis.call('EXISTS', key) == 0 then
  return '1|0|0|0'
end
if num == nil or num < 1 then
  return '3|0|0|0'
end
local cur = tonumber(redis.call('HGET', key, 'cur'))
local max = tonumber(redis.call('HGET', key, 'max'))
local step = math.min(num, max - cur)
if step < 1 then
  return string.format('2|%d|%d|%d', cur, max, cur)
end
local next = redis.call('HINCRBY', key, 'cur', step)
return string.format('0|%d|%d|%d', cur, max, next)
",
};

/// Installs the window `(ARGV[1], ARGV[2]]` for `KEYS[1]`.
pub const REPL: Script = Script {
    name: "segment_repl",
    kind: ScriptKind::Repl,
    source: r"
local key = KEYS[1]
local lower = tonumber(ARGV[1])
local upper = tonumber(ARGV[2])
if lower == nil or upper == nil or lower >= upper then
  return string.format('3|%d|%d', lower or 0, upper or 0)
end
if redis.call('EXISTS', key) == 1 then
  local max = tonumber(redis.call('HGET', key, 'max'))
  if max > lower then
    return string.format('4|%d|%d', lower, upper)
  end
end
redis.call('HSET', key, 'cur', lower, 'max', upper)
return string.format('0|%d|%d', lower, upper)
",
};

/// A parsed INCR reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrReply {
    pub code: Code,
    pub prev: i64,
    pub max: i64,
    pub cur: i64,
}

/// A parsed REPL reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplReply {
    pub code: Code,
    pub lower: i64,
    pub upper: i64,
}

impl IncrReply {
    /// Parses `code|prev|max|cur`. Undefined codes parse as
    /// [`Code::Unknown`].
    ///
    /// # Errors
    ///
    /// [`Error::Unknown`] for a wrong field count or a non-integer field.
    pub fn parse(reply: &str) -> Result<Self> {
        let [code, prev, max, cur] = fields(reply)?;
        Ok(Self {
            code: Code::from_wire(code),
            prev,
            max,
            cur,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.code.to_wire(),
            self.prev,
            self.max,
            self.cur
        )
    }
}

impl ReplReply {
    /// Parses `code|lower|upper`. Undefined codes parse as
    /// [`Code::Unknown`].
    ///
    /// # Errors
    ///
    /// [`Error::Unknown`] for a wrong field count or a non-integer field.
    pub fn parse(reply: &str) -> Result<Self> {
        let [code, lower, upper] = fields(reply)?;
        Ok(Self {
            code: Code::from_wire(code),
            lower,
            upper,
        })
    }

    pub fn encode(&self) -> String {
        format!("{}|{}|{}", self.code.to_wire(), self.lower, self.upper)
    }
}

fn fields<const N: usize>(reply: &str) -> Result<[i64; N]> {
    let unknown = || Error::Unknown {
        reply: reply.to_owned(),
    };
    let mut out = [0; N];
    let mut parts = reply.trim().split('|');
    for slot in &mut out {
        *slot = parts
            .next()
            .and_then(|part| part.trim().parse().ok())
            .ok_or_else(unknown)?;
    }
    if parts.next().is_some() {
        return Err(unknown());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_replies() {
        assert_eq!(
            IncrReply::parse("0|10|100|27").unwrap(),
            IncrReply {
                code: Code::Success,
                prev: 10,
                max: 100,
                cur: 27
            }
        );
        assert_eq!(
            ReplReply::parse("4|-1|99").unwrap(),
            ReplReply {
                code: Code::StaleBounds,
                lower: -1,
                upper: 99
            }
        );
        assert_eq!(IncrReply::parse("9|0|0|0").unwrap().code, Code::Unknown);
    }

    #[test]
    fn malformed_replies_are_unknown() {
        for reply in ["", "0|1|2", "0|1|2|3|4", "0|a|2|3", "ok"] {
            let err = IncrReply::parse(reply).unwrap_err();
            assert!(
                matches!(&err, Error::Unknown { reply: r } if r == reply),
                "{reply:?} -> {err:?}"
            );
        }
        assert!(matches!(
            ReplReply::parse("0|1|2|3"),
            Err(Error::Unknown { .. })
        ));
    }

    #[test]
    fn encode_matches_wire_format() {
        let reply = IncrReply {
            code: Code::Overflow,
            prev: 5,
            max: 5,
            cur: 5,
        };
        assert_eq!(reply.encode(), "2|5|5|5");
        assert_eq!(IncrReply::parse(&reply.encode()).unwrap(), reply);
    }

    #[test]
    fn scripts_name_their_kind() {
        assert_eq!(INCR.kind, ScriptKind::Incr);
        assert_eq!(REPL.kind, ScriptKind::Repl);
        assert!(INCR.source.contains("HINCRBY"));
        assert!(REPL.source.contains("HSET"));
    }
}
