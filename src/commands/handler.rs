//! Command Handler Module
//!
//! This module implements the commands snapkv understands. It takes a
//! decoded [`Command`], runs it against the storage engine (or the snapshot
//! codec, for `SAVE`) and returns the reply.
//!
//! ## Supported Commands
//!
//! - `PING` - Test connection
//! - `ECHO message` - Echo message
//! - `SET key value [PX milliseconds]` - Set a key, optionally with a TTL
//! - `GET key` - Get a key's value
//! - `CONFIG GET parameter` - Read `dir` or `dbfilename`
//! - `KEYS *` - List every key
//! - `SAVE` - Write a snapshot to `<dir>/<dbfilename>`
//!
//! Verbs are case-insensitive. Extra trailing arguments are ignored.

use crate::config::Config;
use crate::protocol::{Command, RespValue};
use crate::snapshot::save_snapshot;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Handles commands by dispatching them to the appropriate handlers.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Server configuration, for CONFIG GET and SAVE
    config: Arc<Config>,
}

impl CommandHandler {
    /// Creates a new command handler over the given storage engine and configuration.
    pub fn new(storage: Arc<StorageEngine>, config: Arc<Config>) -> Self {
        Self { storage, config }
    }

    /// Executes a command and returns the reply.
    ///
    /// An empty command gets no reply at all.
    pub fn execute(&self, command: &Command) -> Option<RespValue> {
        let name = command.name()?;
        Some(self.dispatch(&name, command.args()))
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, cmd: &str, args: &[Bytes]) -> RespValue {
        match cmd {
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "CONFIG" => self.cmd_config(args),
            "KEYS" => self.cmd_keys(args),
            "SAVE" => self.cmd_save(args),

            // Unknown command
            _ => RespValue::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// PING
    fn cmd_ping(&self, _args: &[Bytes]) -> RespValue {
        RespValue::pong()
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[Bytes]) -> RespValue {
        match args.first() {
            Some(msg) => RespValue::bulk_string(msg.clone()),
            None => wrong_arity("echo"),
        }
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> RespValue {
        let (key, value) = match args {
            [key, value, ..] => (key.clone(), value.clone()),
            _ => return wrong_arity("set"),
        };

        // The flag is only looked for right after the value
        let mut ttl_ms: i64 = 0;
        if let Some(flag) = args.get(2) {
            if flag.eq_ignore_ascii_case(b"PX") {
                let Some(raw) = args.get(3) else {
                    return RespValue::error("ERR syntax error");
                };
                ttl_ms = match parse_integer(raw) {
                    Some(ms) => ms,
                    None => {
                        return RespValue::error("ERR value is not an integer or out of range")
                    }
                };
            }
        }

        if ttl_ms > 0 {
            self.storage
                .set_with_ttl(key, value, Duration::from_millis(ttl_ms as u64));
        } else {
            self.storage.set(key, value);
        }
        RespValue::ok()
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> RespValue {
        let Some(key) = args.first() else {
            return wrong_arity("get");
        };

        match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        }
    }

    /// CONFIG GET parameter
    fn cmd_config(&self, args: &[Bytes]) -> RespValue {
        let [subcommand, parameter, ..] = args else {
            return wrong_arity("config");
        };

        if !subcommand.eq_ignore_ascii_case(b"GET") {
            return RespValue::error(format!(
                "ERR unknown CONFIG subcommand '{}'",
                String::from_utf8_lossy(subcommand).to_ascii_uppercase()
            ));
        }

        let name = String::from_utf8_lossy(parameter).to_ascii_lowercase();
        match self.config.get(&name) {
            Some(value) => RespValue::array(vec![
                RespValue::bulk_string(Bytes::from(name)),
                RespValue::bulk_string(Bytes::copy_from_slice(value.as_bytes())),
            ]),
            None => RespValue::null(),
        }
    }

    /// KEYS *
    fn cmd_keys(&self, args: &[Bytes]) -> RespValue {
        match args.first() {
            Some(pattern) if pattern.as_ref() == b"*" => {}
            Some(_) => return RespValue::error("ERR only the '*' pattern is supported"),
            None => return wrong_arity("keys"),
        }

        let keys = self.storage.keys();
        RespValue::array(keys.into_iter().map(RespValue::bulk_string).collect())
    }

    /// SAVE
    fn cmd_save(&self, _args: &[Bytes]) -> RespValue {
        let path = self.config.snapshot_path();
        match save_snapshot(&self.storage, &path) {
            Ok(count) => {
                debug!(path = %path.display(), keys = count, "SAVE completed");
                RespValue::ok()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "SAVE failed");
                RespValue::error(format!("ERR {}", e))
            }
        }
    }
}

/// Parses a decimal integer argument.
fn parse_integer(raw: &[u8]) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

fn wrong_arity(cmd: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::load_snapshot;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        CommandHandler::new(storage, Arc::new(Config::default()))
    }

    fn create_handler_in(dir: &std::path::Path) -> CommandHandler {
        let config = Config {
            dir: dir.display().to_string(),
            ..Config::default()
        };
        CommandHandler::new(Arc::new(StorageEngine::new()), Arc::new(config))
    }

    fn make_command(args: &[&str]) -> Command {
        Command::from(args)
    }

    fn run(handler: &CommandHandler, args: &[&str]) -> RespValue {
        handler
            .execute(&make_command(args))
            .expect("non-empty command should get a reply")
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["PING"]), RespValue::pong());
        assert_eq!(run(&handler, &["ping", "ignored"]), RespValue::pong());
    }

    #[test]
    fn test_echo() {
        let handler = create_handler();

        assert_eq!(
            run(&handler, &["ECHO", "hello"]),
            RespValue::bulk_string(Bytes::from("hello"))
        );
        assert!(run(&handler, &["ECHO"]).is_error());
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["SET", "foo", "bar"]), RespValue::ok());
        assert_eq!(
            run(&handler, &["GET", "foo"]),
            RespValue::bulk_string(Bytes::from("bar"))
        );
    }

    #[test]
    fn test_verb_case_insensitive_args_case_sensitive() {
        let handler = create_handler();

        run(&handler, &["set", "Key", "Value"]);
        assert_eq!(
            run(&handler, &["gEt", "Key"]),
            RespValue::bulk_string(Bytes::from("Value"))
        );
        assert_eq!(run(&handler, &["GET", "key"]), RespValue::null());
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["GET", "missing"]), RespValue::null());
    }

    #[test]
    fn test_arity_errors() {
        let handler = create_handler();

        let cases: [&[&str]; 6] = [
            &["SET"],
            &["SET", "only-key"],
            &["GET"],
            &["CONFIG"],
            &["CONFIG", "GET"],
            &["KEYS"],
        ];
        for args in cases {
            let response = run(&handler, args);
            assert!(response.is_error(), "{:?} should fail", args);
        }
        assert_eq!(
            run(&handler, &["GET"]),
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
    }

    #[test]
    fn test_set_px_expires() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["SET", "foo", "bar", "PX", "50"]), RespValue::ok());
        assert_eq!(
            run(&handler, &["GET", "foo"]),
            RespValue::bulk_string(Bytes::from("bar"))
        );

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(run(&handler, &["GET", "foo"]), RespValue::null());
    }

    #[test]
    fn test_set_px_flag_case_insensitive() {
        let handler = create_handler();

        run(&handler, &["SET", "foo", "bar", "px", "30"]);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(run(&handler, &["GET", "foo"]), RespValue::null());
    }

    #[test]
    fn test_set_non_positive_px_never_expires() {
        let handler = create_handler();

        run(&handler, &["SET", "zero", "v", "PX", "0"]);
        run(&handler, &["SET", "negative", "v", "PX", "-5"]);
        std::thread::sleep(Duration::from_millis(20));

        assert!(!run(&handler, &["GET", "zero"]).is_null());
        assert!(!run(&handler, &["GET", "negative"]).is_null());
    }

    #[test]
    fn test_set_without_px_clears_ttl() {
        let handler = create_handler();

        run(&handler, &["SET", "foo", "old", "PX", "30"]);
        run(&handler, &["SET", "foo", "new"]);
        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(
            run(&handler, &["GET", "foo"]),
            RespValue::bulk_string(Bytes::from("new"))
        );
    }

    #[test]
    fn test_set_px_invalid() {
        let handler = create_handler();

        assert_eq!(
            run(&handler, &["SET", "foo", "bar", "PX", "soon"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert_eq!(
            run(&handler, &["SET", "foo", "bar", "PX"]),
            RespValue::error("ERR syntax error")
        );
        // Rejected commands write nothing
        assert_eq!(run(&handler, &["GET", "foo"]), RespValue::null());
    }

    #[test]
    fn test_config_get() {
        let handler = create_handler();

        assert_eq!(
            run(&handler, &["CONFIG", "GET", "dir"]),
            RespValue::array(vec![
                RespValue::bulk_string(Bytes::from("dir")),
                RespValue::bulk_string(Bytes::from("/tmp/redis-data")),
            ])
        );
        assert_eq!(
            run(&handler, &["config", "get", "DBFILENAME"]).serialize(),
            b"*2\r\n$10\r\ndbfilename\r\n$8\r\ndump.rdb\r\n"
        );
        assert_eq!(run(&handler, &["CONFIG", "GET", "maxmemory"]), RespValue::null());
        assert!(run(&handler, &["CONFIG", "SET", "dir"]).is_error());
    }

    #[test]
    fn test_keys() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["KEYS", "*"]), RespValue::array(vec![]));

        run(&handler, &["SET", "a", "1"]);
        run(&handler, &["SET", "b", "2"]);

        let RespValue::Array(items) = run(&handler, &["KEYS", "*"]) else {
            panic!("KEYS should reply with an array");
        };
        let mut keys: Vec<Bytes> = items
            .into_iter()
            .map(|item| match item {
                RespValue::BulkString(b) => b,
                other => panic!("unexpected item {:?}", other),
            })
            .collect();
        keys.sort();
        assert_eq!(keys, vec![Bytes::from("a"), Bytes::from("b")]);

        assert!(run(&handler, &["KEYS", "a*"]).is_error());
    }

    #[test]
    fn test_save_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let handler = create_handler_in(dir.path());

        run(&handler, &["SET", "foo", "bar"]);
        run(&handler, &["SET", "count", "42", "PX", "100000"]);
        assert_eq!(run(&handler, &["SAVE"]), RespValue::ok());

        let restored = StorageEngine::new();
        assert_eq!(load_snapshot(&restored, &dir.path().join("dump.rdb")), 2);
        assert_eq!(restored.get(&Bytes::from("foo")), Some(Bytes::from("bar")));
    }

    #[test]
    fn test_save_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let handler = create_handler_in(&blocker.join("sub"));

        let response = run(&handler, &["SAVE"]);
        match response {
            RespValue::Error(msg) => assert!(msg.starts_with("ERR failed to create snapshot file")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_key_and_value() {
        let handler = create_handler();
        let set = Command::new(vec![
            Bytes::from_static(b"SET"),
            Bytes::from_static(b"k\xff"),
            Bytes::from_static(b"\xe9"),
        ]);

        assert_eq!(handler.execute(&set), Some(RespValue::ok()));

        let get = Command::new(vec![Bytes::from_static(b"GET"), Bytes::from_static(b"k\xff")]);
        let reply = handler.execute(&get).unwrap();
        assert_eq!(reply.serialize(), b"$1\r\n\xe9\r\n");
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        assert_eq!(
            run(&handler, &["FLUSHALL"]),
            RespValue::error("ERR unknown command 'FLUSHALL'")
        );
    }

    #[test]
    fn test_empty_command_has_no_reply() {
        let handler = create_handler();

        assert!(handler.execute(&Command::new(vec![])).is_none());
    }
}
