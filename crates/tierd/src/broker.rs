//! Publish/subscribe fan-out between client connections

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::glob;
use crate::resp::RespValue;

/// Identifier of a client connection
pub type ConnectionId = u64;

#[derive(Debug)]
struct Subscriber {
    outbox: UnboundedSender<RespValue>,
    channels: AHashSet<Vec<u8>>,
    patterns: AHashSet<Vec<u8>>,
}

impl Subscriber {
    fn count(&self) -> i64 {
        (self.channels.len() + self.patterns.len()) as i64
    }
}

/// Registry of subscribed connections
#[derive(Debug, Default)]
pub struct Broker {
    subscribers: Mutex<AHashMap<ConnectionId, Subscriber>>,
}

/// Which registry a (un)subscribe call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// Exact channel names
    Channel,
    /// Glob patterns
    Pattern,
}

impl Topic {
    fn verbs(self) -> (&'static str, &'static str) {
        match self {
            Topic::Channel => ("subscribe", "unsubscribe"),
            Topic::Pattern => ("psubscribe", "punsubscribe"),
        }
    }
}

impl Broker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `names` for `conn` and return one confirmation per name
    pub fn subscribe(
        &self,
        conn: ConnectionId,
        outbox: &UnboundedSender<RespValue>,
        topic: Topic,
        names: &[Vec<u8>],
    ) -> Vec<RespValue> {
        let mut subscribers = self.subscribers.lock();
        let subscriber = subscribers.entry(conn).or_insert_with(|| Subscriber {
            outbox: outbox.clone(),
            channels: AHashSet::new(),
            patterns: AHashSet::new(),
        });

        let (verb, _) = topic.verbs();
        names
            .iter()
            .map(|name| {
                match topic {
                    Topic::Channel => subscriber.channels.insert(name.clone()),
                    Topic::Pattern => subscriber.patterns.insert(name.clone()),
                };
                confirmation(verb, Some(name), subscriber.count())
            })
            .collect()
    }

    /// Drop `names` (or everything of that topic when empty) for `conn`
    pub fn unsubscribe(&self, conn: ConnectionId, topic: Topic, names: &[Vec<u8>]) -> Vec<RespValue> {
        let mut subscribers = self.subscribers.lock();
        let (_, verb) = topic.verbs();

        let Some(subscriber) = subscribers.get_mut(&conn) else {
            return vec![confirmation(verb, names.first(), 0)];
        };

        let targets: Vec<Vec<u8>> = match (names.is_empty(), topic) {
            (false, _) => names.to_vec(),
            (true, Topic::Channel) => subscriber.channels.iter().cloned().collect(),
            (true, Topic::Pattern) => subscriber.patterns.iter().cloned().collect(),
        };

        let mut replies = Vec::with_capacity(targets.len().max(1));
        for name in &targets {
            match topic {
                Topic::Channel => subscriber.channels.remove(name),
                Topic::Pattern => subscriber.patterns.remove(name),
            };
            replies.push(confirmation(verb, Some(name), subscriber.count()));
        }
        if replies.is_empty() {
            replies.push(confirmation(verb, None, subscriber.count()));
        }

        if subscriber.count() == 0 {
            subscribers.remove(&conn);
        }
        replies
    }

    /// Whether `conn` holds any subscription
    pub fn is_subscribed(&self, conn: ConnectionId) -> bool {
        self.subscribers.lock().contains_key(&conn)
    }

    /// Forget a disconnected client
    pub fn disconnect(&self, conn: ConnectionId) {
        self.subscribers.lock().remove(&conn);
    }

    /// Deliver `payload` to every matching subscriber, returning the receiver count
    pub fn publish(&self, channel: &[u8], payload: &[u8]) -> i64 {
        let subscribers = self.subscribers.lock();
        let mut delivered = 0;

        for subscriber in subscribers.values() {
            if subscriber.channels.contains(channel) {
                let message = RespValue::bulk_array([b"message".to_vec(), channel.to_vec(), payload.to_vec()]);
                if subscriber.outbox.send(message).is_ok() {
                    delivered += 1;
                }
            }
            for pattern in &subscriber.patterns {
                if glob::matches(pattern, channel) {
                    let message = RespValue::bulk_array([
                        b"pmessage".to_vec(),
                        pattern.clone(),
                        channel.to_vec(),
                        payload.to_vec(),
                    ]);
                    if subscriber.outbox.send(message).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }

        delivered
    }
}

fn confirmation(verb: &str, name: Option<&Vec<u8>>, count: i64) -> RespValue {
    RespValue::Array(Some(vec![
        RespValue::bulk(verb),
        name.map_or_else(RespValue::null, |name| RespValue::bulk(name.clone())),
        RespValue::Integer(count),
    ]))
}
