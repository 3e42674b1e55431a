//! Command handler for the RESP server

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::broker::{Broker, ConnectionId, Topic};
use crate::keyspace::{CounterError, Keyspace, DEFAULT_SCAN_COUNT};
use crate::resp::RespValue;

/// State shared by every connection
#[derive(Debug, Default)]
pub struct Shared {
    /// String keys
    pub keyspace: Keyspace,
    /// Pub/sub registry
    pub broker: Broker,
}

/// Per-connection command dispatcher
pub struct CommandHandler {
    shared: Arc<Shared>,
    conn: ConnectionId,
    outbox: UnboundedSender<RespValue>,
}

fn wrong_args(command: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        command.to_lowercase()
    ))
}

fn not_integer() -> RespValue {
    RespValue::error("ERR value is not an integer or out of range")
}

fn syntax_error() -> RespValue {
    RespValue::error("ERR syntax error")
}

fn counter_error(err: CounterError, float: bool) -> RespValue {
    match (err, float) {
        (CounterError::NotANumber, false) => not_integer(),
        (CounterError::NotANumber, true) => RespValue::error("ERR value is not a valid float"),
        (CounterError::Overflow, false) => {
            RespValue::error("ERR increment or decrement would overflow")
        }
        (CounterError::Overflow, true) => {
            RespValue::error("ERR increment would produce NaN or Infinity")
        }
    }
}

fn parse_arg<T: std::str::FromStr>(arg: &[u8]) -> Option<T> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

impl CommandHandler {
    /// Create a handler for connection `conn`; pub/sub pushes go to `outbox`
    pub fn new(shared: Arc<Shared>, conn: ConnectionId, outbox: UnboundedSender<RespValue>) -> Self {
        Self {
            shared,
            conn,
            outbox,
        }
    }

    /// Execute one command and return its replies in order
    ///
    /// Most commands produce exactly one reply; (un)subscribe commands produce
    /// one confirmation per channel.
    pub fn handle(&self, cmd: RespValue) -> Vec<RespValue> {
        let items = match cmd {
            RespValue::Array(Some(items)) if !items.is_empty() => items,
            _ => return vec![RespValue::error("ERR invalid command format")],
        };

        let mut args = Vec::with_capacity(items.len());
        for item in &items {
            match item.as_bytes() {
                Some(bytes) => args.push(bytes.to_vec()),
                None => return vec![RespValue::error("ERR invalid argument type")],
            }
        }

        let command = String::from_utf8_lossy(&args[0]).to_uppercase();
        let args = &args[1..];

        match command.as_str() {
            "SUBSCRIBE" | "PSUBSCRIBE" if args.is_empty() => vec![wrong_args(&command)],
            "SUBSCRIBE" => self.shared.broker.subscribe(self.conn, &self.outbox, Topic::Channel, args),
            "PSUBSCRIBE" => self.shared.broker.subscribe(self.conn, &self.outbox, Topic::Pattern, args),
            "UNSUBSCRIBE" => self.shared.broker.unsubscribe(self.conn, Topic::Channel, args),
            "PUNSUBSCRIBE" => self.shared.broker.unsubscribe(self.conn, Topic::Pattern, args),
            _ => vec![self.handle_single(&command, args)],
        }
    }

    fn handle_single(&self, command: &str, args: &[Vec<u8>]) -> RespValue {
        let keyspace = &self.shared.keyspace;

        match command {
            "PING" => match args {
                [] => RespValue::SimpleString("PONG".to_string()),
                [message] => RespValue::bulk(message.clone()),
                _ => wrong_args(command),
            },
            "ECHO" => match args {
                [message] => RespValue::bulk(message.clone()),
                _ => wrong_args(command),
            },
            "GET" => match args {
                [key] => keyspace
                    .get(key)
                    .map_or_else(RespValue::null, RespValue::bulk),
                _ => wrong_args(command),
            },
            "SET" => self.handle_set(args),
            "SETEX" => match args {
                [key, seconds, value] => match parse_arg::<u64>(seconds) {
                    Some(seconds) if seconds > 0 => {
                        keyspace.set(key, value.clone(), Some(Duration::from_secs(seconds)));
                        RespValue::ok()
                    }
                    Some(_) => RespValue::error("ERR invalid expire time in 'setex' command"),
                    None => not_integer(),
                },
                _ => wrong_args(command),
            },
            "DEL" if !args.is_empty() => RespValue::Integer(keyspace.del(&borrowed(args))),
            "EXISTS" if !args.is_empty() => RespValue::Integer(keyspace.exists(&borrowed(args))),
            "TTL" => match args {
                [key] => RespValue::Integer(keyspace.ttl(key)),
                _ => wrong_args(command),
            },
            "INCR" => match args {
                [key] => keyspace
                    .incr_by(key, 1)
                    .map_or_else(|e| counter_error(e, false), RespValue::Integer),
                _ => wrong_args(command),
            },
            "INCRBY" => match args {
                [key, step] => match parse_arg::<i64>(step) {
                    Some(step) => keyspace
                        .incr_by(key, step)
                        .map_or_else(|e| counter_error(e, false), RespValue::Integer),
                    None => not_integer(),
                },
                _ => wrong_args(command),
            },
            "INCRBYFLOAT" => match args {
                [key, step] => match parse_arg::<f64>(step) {
                    Some(step) => keyspace.incr_by_float(key, step).map_or_else(
                        |e| counter_error(e, true),
                        |value| RespValue::bulk(value.to_string()),
                    ),
                    None => RespValue::error("ERR value is not a valid float"),
                },
                _ => wrong_args(command),
            },
            "SCAN" => self.handle_scan(args),
            "PUBLISH" => match args {
                [channel, message] => {
                    RespValue::Integer(self.shared.broker.publish(channel, message))
                }
                _ => wrong_args(command),
            },
            "DBSIZE" => RespValue::Integer(keyspace.len() as i64),
            "FLUSHDB" | "FLUSHALL" => {
                keyspace.flush();
                RespValue::ok()
            }
            "SELECT" => match args {
                [db] if parse_arg::<u32>(db) == Some(0) => RespValue::ok(),
                [_] => RespValue::error("ERR DB index is out of range"),
                _ => wrong_args(command),
            },
            // Connection metadata (CLIENT SETNAME / SETINFO) is accepted and ignored
            "CLIENT" => RespValue::ok(),
            "INFO" => self.handle_info(),
            "COMMAND" => RespValue::Array(Some(vec![])),
            "DEL" | "EXISTS" => wrong_args(command),
            _ => RespValue::error(format!("ERR unknown command '{}'", command)),
        }
    }

    fn handle_set(&self, args: &[Vec<u8>]) -> RespValue {
        let (key, value, options) = match args {
            [key, value, options @ ..] => (key, value, options),
            _ => return wrong_args("SET"),
        };

        let ttl = match options {
            [] => None,
            [flag, amount] => {
                let flag = String::from_utf8_lossy(flag).to_uppercase();
                let amount = match parse_arg::<i64>(amount) {
                    Some(amount) => amount,
                    None => return not_integer(),
                };
                if amount <= 0 {
                    return RespValue::error("ERR invalid expire time in 'set' command");
                }
                match flag.as_str() {
                    "EX" => Some(Duration::from_secs(amount as u64)),
                    "PX" => Some(Duration::from_millis(amount as u64)),
                    _ => return syntax_error(),
                }
            }
            _ => return syntax_error(),
        };

        self.shared.keyspace.set(key, value.clone(), ttl);
        RespValue::ok()
    }

    fn handle_scan(&self, args: &[Vec<u8>]) -> RespValue {
        let Some((cursor, options)) = args.split_first() else {
            return wrong_args("SCAN");
        };
        let Some(cursor) = parse_arg::<usize>(cursor) else {
            return RespValue::error("ERR invalid cursor");
        };

        let mut pattern = None;
        let mut count = DEFAULT_SCAN_COUNT;
        for pair in options.chunks(2) {
            match pair {
                [flag, value] if flag.eq_ignore_ascii_case(b"MATCH") => {
                    pattern = Some(value.as_slice())
                }
                [flag, value] if flag.eq_ignore_ascii_case(b"COUNT") => {
                    match parse_arg::<usize>(value) {
                        Some(n) if n > 0 => count = n,
                        _ => return not_integer(),
                    }
                }
                _ => return syntax_error(),
            }
        }

        let (next, keys) = self.shared.keyspace.scan(cursor, pattern, count);
        RespValue::Array(Some(vec![
            RespValue::bulk(next.to_string()),
            RespValue::bulk_array(keys),
        ]))
    }

    fn handle_info(&self) -> RespValue {
        let info = format!(
            "# Server\r\n\
             tierd_version:{}\r\n\
             \r\n\
             # Keyspace\r\n\
             keys:{}\r\n",
            env!("CARGO_PKG_VERSION"),
            self.shared.keyspace.len(),
        );
        RespValue::bulk(info)
    }
}

fn borrowed(args: &[Vec<u8>]) -> Vec<&[u8]> {
    args.iter().map(Vec::as_slice).collect()
}
