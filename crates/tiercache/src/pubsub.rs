//! Background pub/sub listeners

use std::future::Future;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

/// Handle to a running listener
///
/// Dropping the handle leaves the listener running for the life of the
/// process; call [`Subscription::cancel`] to stop it.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop the listener
    pub fn cancel(self) {
        self.task.abort();
    }

    /// Whether the listener has stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// What a listener subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Topic {
    Channels,
    Patterns,
}

/// Open a dedicated pub/sub connection, subscribe and spawn the receive loop
///
/// Returns once the server has confirmed the subscription, so messages
/// published afterwards are not missed.
pub(crate) async fn listen<F, Fut>(
    client: &redis::Client,
    topic: Topic,
    names: &[String],
    mut on_message: F,
) -> Result<Subscription>
where
    F: FnMut(String, String) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut pubsub = client.get_async_pubsub().await?;
    match topic {
        Topic::Channels => pubsub.subscribe(names.to_vec()).await?,
        Topic::Patterns => pubsub.psubscribe(names.to_vec()).await?,
    }
    debug!(names = ?names, ?topic, "pub/sub listener subscribed");

    let task = tokio::spawn(async move {
        let mut stream = pubsub.into_on_message();
        while let Some(msg) = stream.next().await {
            let channel = msg.get_channel_name().to_string();
            match msg.get_payload::<String>() {
                Ok(payload) => on_message(channel, payload).await,
                Err(e) => warn!(channel = %channel, error = %e, "dropping undecodable pub/sub payload"),
            }
        }
        debug!("pub/sub connection closed");
    });

    Ok(Subscription { task })
}
