//! Command dispatch.
//!
//! A parsed request is a list of argument byte strings; the first names the
//! command, compared ASCII case-insensitively. Commands whose name or arity
//! does not match anything in the table get an unknown-command error, and
//! the connection keeps going. Only malformed frames close a connection;
//! that is decided a layer below, not here.

use std::collections::HashSet;

use crate::keyspace::{Entry, Keyspace, Value};
use crate::protocol::{Response, ERR_ARG, ERR_TYPE, ERR_UNKNOWN};
use crate::zset::ZSet;

/// What the event loop should do after a response is serialized.
#[derive(PartialEq, Eq, Debug)]
pub enum Action {
    Continue,
    /// Stop the event loop once this response is on its way.
    Shutdown,
}

/// Run one request against the keyspace, serializing the reply into `out`.
pub fn dispatch(cmd: &[Vec<u8>], ks: &mut Keyspace, now_us: u64, out: &mut Response) -> Action {
    let argc = cmd.len();
    if argc == 0 {
        out.err(ERR_UNKNOWN, "Unknown cmd");
        return Action::Continue;
    }
    let name = &cmd[0];
    if argc == 1 && cmd_is(name, b"keys") {
        do_keys(ks, out);
    } else if argc == 2 && cmd_is(name, b"get") {
        do_get(ks, &cmd[1], out);
    } else if argc == 3 && cmd_is(name, b"set") {
        do_set(ks, &cmd[1], &cmd[2], out);
    } else if argc == 2 && cmd_is(name, b"del") {
        out.int(ks.remove(&cmd[1]) as i64);
    } else if argc == 3 && cmd_is(name, b"expire") {
        do_expire(ks, &cmd[1], &cmd[2], now_us, out);
    } else if argc == 2 && cmd_is(name, b"pttl") {
        out.int(ks.ttl_remaining_ms(&cmd[1], now_us));
    } else if argc >= 2 && cmd_is(name, b"exists") {
        do_exists(ks, &cmd[1..], out);
    } else if (argc == 1 || argc == 2) && cmd_is(name, b"command") {
        do_command(cmd, out);
    } else if argc == 4 && cmd_is(name, b"zadd") {
        do_zadd(ks, &cmd[1], &cmd[2], &cmd[3], out);
    } else if argc == 3 && cmd_is(name, b"zrem") {
        do_zrem(ks, &cmd[1], &cmd[2], out);
    } else if argc == 3 && cmd_is(name, b"zscore") {
        do_zscore(ks, &cmd[1], &cmd[2], out);
    } else if argc == 6 && cmd_is(name, b"zquery") {
        do_zquery(ks, cmd, out);
    } else if argc == 1 && cmd_is(name, b"shutdown") {
        out.str_bytes(b"Server is shutting down...");
        return Action::Shutdown;
    } else {
        out.err(ERR_UNKNOWN, "Unknown cmd");
    }
    Action::Continue
}

fn cmd_is(word: &[u8], expected: &[u8]) -> bool {
    word.eq_ignore_ascii_case(expected)
}

// ── Numeric argument parsing ─────────────────────────────────────────────────

/// Parse a score. NaN and trailing garbage are rejected.
fn parse_f64(bytes: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(bytes).ok()?;
    let value: f64 = text.parse().ok()?;
    (!value.is_nan()).then_some(value)
}

/// Parse a signed 64-bit decimal with no trailing garbage.
fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

// ── String commands ──────────────────────────────────────────────────────────

fn do_get(ks: &mut Keyspace, key: &[u8], out: &mut Response) {
    match ks.get(key) {
        None => out.nil(),
        Some(entry) => match &entry.value {
            Value::Str(value) => out.str_bytes(value),
            Value::ZSet(_) => out.err(ERR_TYPE, "expect string type"),
        },
    }
}

fn do_set(ks: &mut Keyspace, key: &[u8], value: &[u8], out: &mut Response) {
    if let Some(entry) = ks.get_mut(key) {
        match &mut entry.value {
            Value::Str(held) => {
                *held = value.to_vec();
                out.nil();
            }
            Value::ZSet(_) => out.err(ERR_TYPE, "expect string type"),
        }
        return;
    }
    ks.insert(Entry::new_str(key, value));
    out.nil();
}

fn do_keys(ks: &mut Keyspace, out: &mut Response) {
    out.arr(ks.len() as u32);
    ks.for_each_key(|key| out.str_bytes(key));
}

fn do_exists(ks: &mut Keyspace, keys: &[Vec<u8>], out: &mut Response) {
    // Duplicate queries collapse to one.
    let distinct: HashSet<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
    let mut present = 0i64;
    for key in distinct {
        if ks.contains(key) {
            present += 1;
        }
    }
    out.int(present);
}

// ── TTL commands ─────────────────────────────────────────────────────────────

fn do_expire(ks: &mut Keyspace, key: &[u8], ttl: &[u8], now_us: u64, out: &mut Response) {
    let Some(ttl_ms) = parse_i64(ttl) else {
        out.err(ERR_ARG, "expect int64");
        return;
    };
    out.int(ks.set_ttl(key, ttl_ms, now_us) as i64);
}

// ── Sorted-set commands ──────────────────────────────────────────────────────

fn do_zadd(ks: &mut Keyspace, key: &[u8], score: &[u8], member: &[u8], out: &mut Response) {
    let Some(score) = parse_f64(score) else {
        out.err(ERR_ARG, "expected a floating point number");
        return;
    };
    if let Some(entry) = ks.get_mut(key) {
        match &mut entry.value {
            Value::ZSet(zset) => {
                let inserted = zset.add(member, score);
                out.int(inserted as i64);
            }
            Value::Str(_) => out.err(ERR_TYPE, "expect zset type"),
        }
        return;
    }
    let mut zset = Box::new(ZSet::new());
    zset.add(member, score);
    ks.insert(Entry::new_zset(key, zset));
    out.int(1);
}

/// Fetch the sorted set behind `key`, reporting nil for a missing key and a
/// type error for a string.
fn expect_zset<'a>(ks: &'a mut Keyspace, key: &[u8], out: &mut Response) -> Option<&'a mut ZSet> {
    match ks.get_mut(key) {
        None => {
            out.nil();
            None
        }
        Some(entry) => match &mut entry.value {
            Value::ZSet(zset) => Some(zset),
            Value::Str(_) => {
                out.err(ERR_TYPE, "expect zset type");
                None
            }
        },
    }
}

fn do_zrem(ks: &mut Keyspace, key: &[u8], member: &[u8], out: &mut Response) {
    let Some(zset) = expect_zset(ks, key, out) else {
        return;
    };
    let removed = zset.pop(member).is_some();
    out.int(removed as i64);
}

fn do_zscore(ks: &mut Keyspace, key: &[u8], member: &[u8], out: &mut Response) {
    let Some(zset) = expect_zset(ks, key, out) else {
        return;
    };
    match zset.score(member) {
        Some(score) => out.dbl(score),
        None => out.nil(),
    }
}

fn do_zquery(ks: &mut Keyspace, cmd: &[Vec<u8>], out: &mut Response) {
    let Some(score) = parse_f64(&cmd[2]) else {
        out.err(ERR_ARG, "invalid score");
        return;
    };
    let name = &cmd[3];
    let (Some(offset), Some(limit)) = (parse_i64(&cmd[4]), parse_i64(&cmd[5])) else {
        out.err(ERR_ARG, "invalid offset or limit");
        return;
    };

    let zset = match ks.get_mut(&cmd[1]) {
        None => {
            // A missing key reads as an empty range.
            out.arr(0);
            return;
        }
        Some(entry) => match &mut entry.value {
            Value::ZSet(zset) => zset,
            Value::Str(_) => {
                out.err(ERR_TYPE, "expect zset type");
                return;
            }
        },
    };

    if limit <= 0 {
        out.arr(0);
        return;
    }
    let start = zset
        .query(score, name)
        .and_then(|id| zset.offset(id, offset));

    let patch = out.begin_arr();
    let mut cur = start;
    let mut pairs = 0i64;
    while let Some(id) = cur {
        if pairs >= limit {
            break;
        }
        let item = zset.item(id);
        out.str_bytes(&item.name);
        out.dbl(item.score);
        pairs += 1;
        cur = zset.offset(id, 1);
    }
    out.end_arr(patch, (pairs * 2) as u32);
}

// ── Help ─────────────────────────────────────────────────────────────────────

const COMMANDS_LIST: &str = "All supported commands:\n\
    1.  get\n\
    2.  set\n\
    3.  del\n\
    4.  keys\n\
    5.  zadd\n\
    6.  zrem\n\
    7.  zscore\n\
    8.  zquery\n\
    9.  exists\n\
    10. expire\n\
    11. pttl\n\
    12. command\n\
    13. shutdown\n";

const COMMANDS_DESCRIPTION: &str = "All supported commands:\n\n\
    1.  get: Retrieves the value associated with the provided key.\n\
    \x20    Returns the value, or nil when the key is missing.\n\n\
    2.  set: Associates the provided key with a string value,\n\
    \x20    creating or overwriting it. Returns nil.\n\n\
    3.  del: Removes the key and its value.\n\
    \x20    Returns 1 when a key was removed, 0 otherwise.\n\n\
    4.  keys: Returns an array of all keys in the store.\n\n\
    5.  zadd: Adds a member to a sorted set, or updates its score.\n\
    \x20    Takes the set name, the score, and the member.\n\
    \x20    Returns 1 for a new member, 0 for an update.\n\n\
    6.  zrem: Removes a member from a sorted set.\n\
    \x20    Takes the set name and the member.\n\n\
    7.  zscore: Retrieves the score of a member in a sorted set.\n\
    \x20    Takes the set name and the member.\n\n\
    8.  zquery: Walks a sorted set in score order.\n\
    \x20    Takes the set name, a starting score and member,\n\
    \x20    an offset, and a limit; returns member, score pairs.\n\n\
    9.  exists: Counts how many of the named keys are present.\n\
    \x20    Duplicate names count once.\n\n\
    10. expire: Sets a key's time to live in milliseconds.\n\
    \x20    A negative value clears the timer.\n\n\
    11. pttl: Returns a key's remaining time to live in milliseconds,\n\
    \x20    -1 when it has no timer, -2 when the key is missing.\n\n\
    12. command: Prints this description, or the short list\n\
    \x20    when called as 'command list'.\n\n\
    13. shutdown: Shuts the server down.\n\n\
    All commands are processed case-insensitively.\n";

fn do_command(cmd: &[Vec<u8>], out: &mut Response) {
    if cmd.len() >= 2 {
        if cmd_is(&cmd[1], b"list") {
            out.str_bytes(COMMANDS_LIST.as_bytes());
        } else {
            out.str_bytes(b"");
        }
    } else {
        out.str_bytes(COMMANDS_DESCRIPTION.as_bytes());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{read_le32, TAG_ARR, TAG_ERR, TAG_INT, TAG_NIL, TAG_STR};

    fn run(ks: &mut Keyspace, args: &[&[u8]]) -> Vec<u8> {
        let cmd: Vec<Vec<u8>> = args.iter().map(|a| a.to_vec()).collect();
        let mut out = Response::new();
        dispatch(&cmd, ks, 0, &mut out);
        out.as_bytes().to_vec()
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut ks = Keyspace::new();
        assert_eq!(run(&mut ks, &[b"SET", b"k", b"hello"]), vec![TAG_NIL]);
        let reply = run(&mut ks, &[b"get", b"k"]);
        assert_eq!(reply[0], TAG_STR);
        assert_eq!(&reply[5..], b"hello");
    }

    #[test]
    fn get_missing_is_nil() {
        let mut ks = Keyspace::new();
        assert_eq!(run(&mut ks, &[b"get", b"missing"]), vec![TAG_NIL]);
    }

    #[test]
    fn del_reports_removal() {
        let mut ks = Keyspace::new();
        run(&mut ks, &[b"set", b"k", b"x"]);
        let reply = run(&mut ks, &[b"del", b"k"]);
        assert_eq!(reply[0], TAG_INT);
        assert_eq!(reply[1], 1);
        assert_eq!(run(&mut ks, &[b"get", b"k"]), vec![TAG_NIL]);
    }

    #[test]
    fn type_confusion_is_an_error() {
        let mut ks = Keyspace::new();
        run(&mut ks, &[b"zadd", b"z", b"1.0", b"m"]);
        let reply = run(&mut ks, &[b"get", b"z"]);
        assert_eq!(reply[0], TAG_ERR);
        assert_eq!(read_le32(&reply, 1) as i32, ERR_TYPE);
        let reply = run(&mut ks, &[b"set", b"z", b"v"]);
        assert_eq!(reply[0], TAG_ERR);
    }

    #[test]
    fn exists_collapses_duplicates() {
        let mut ks = Keyspace::new();
        run(&mut ks, &[b"set", b"a", b"1"]);
        let reply = run(&mut ks, &[b"exists", b"a", b"a", b"b"]);
        assert_eq!(reply[0], TAG_INT);
        assert_eq!(i64::from_le_bytes(reply[1..9].try_into().unwrap()), 1);
    }

    #[test]
    fn zadd_reports_new_vs_update() {
        let mut ks = Keyspace::new();
        let reply = run(&mut ks, &[b"zadd", b"z", b"1.5", b"alpha"]);
        assert_eq!(i64::from_le_bytes(reply[1..9].try_into().unwrap()), 1);
        let reply = run(&mut ks, &[b"zadd", b"z", b"2.5", b"alpha"]);
        assert_eq!(i64::from_le_bytes(reply[1..9].try_into().unwrap()), 0);
    }

    #[test]
    fn zadd_rejects_nan_and_garbage() {
        let mut ks = Keyspace::new();
        let bads: [&[u8]; 3] = [b"nan", b"1.5x", b""];
        for bad in bads {
            let reply = run(&mut ks, &[b"zadd", b"z", bad, b"m"]);
            assert_eq!(reply[0], TAG_ERR, "score {:?} must be rejected", bad);
            assert_eq!(read_le32(&reply, 1) as i32, ERR_ARG);
        }
    }

    #[test]
    fn zquery_walks_range_in_order() {
        let mut ks = Keyspace::new();
        run(&mut ks, &[b"zadd", b"z", b"1.5", b"alpha"]);
        run(&mut ks, &[b"zadd", b"z", b"2.5", b"beta"]);
        let reply = run(&mut ks, &[b"zquery", b"z", b"0", b"", b"0", b"10"]);
        assert_eq!(reply[0], TAG_ARR);
        assert_eq!(read_le32(&reply, 1), 4);
        // First element is the member name "alpha".
        assert_eq!(reply[5], TAG_STR);
        assert_eq!(&reply[10..15], b"alpha");
    }

    #[test]
    fn zquery_missing_key_is_empty_array() {
        let mut ks = Keyspace::new();
        let reply = run(&mut ks, &[b"zquery", b"none", b"0", b"", b"0", b"10"]);
        assert_eq!(reply[0], TAG_ARR);
        assert_eq!(read_le32(&reply, 1), 0);
    }

    #[test]
    fn unknown_and_wrong_arity_fall_through() {
        let mut ks = Keyspace::new();
        let cases: [&[&[u8]]; 3] = [&[b"nosuch"], &[b"get"], &[b"set", b"k"]];
        for cmd in cases {
            let reply = run(&mut ks, cmd);
            assert_eq!(reply[0], TAG_ERR);
            assert_eq!(read_le32(&reply, 1) as i32, ERR_UNKNOWN);
        }
    }

    #[test]
    fn shutdown_reports_action() {
        let mut ks = Keyspace::new();
        let cmd = vec![b"shutdown".to_vec()];
        let mut out = Response::new();
        assert_eq!(dispatch(&cmd, &mut ks, 0, &mut out), Action::Shutdown);
        assert_eq!(out.as_bytes()[0], TAG_STR);
    }
}
