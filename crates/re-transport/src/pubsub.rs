use std::sync::Arc;

use async_trait::async_trait;
use re_core::message::Message as CoreMessage;
use re_core::ports::{MessageHandler, PubSub};
use re_core::RulesError;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::error::TransportError;
use crate::message::Message;
use crate::transport::Transport;

/// ZeroMQ PUB/SUB client implementing [`re_core::ports::PubSub`].
///
/// Publishes connect to the broker's frontend (its SUB side); subscriptions
/// connect to the broker's backend (its PUB side). Messages travel as
/// two-frame ZMQ frames: `[topic, msgpack envelope]`, where the envelope
/// wraps a [`re_core::message::Message`] (spec §6 "Topic format").
pub struct ZmqPubSub {
    publisher: Mutex<PubSocket>,
    subscriber: Arc<Mutex<SubSocket>>,
    stop: Arc<Notify>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ZmqPubSub {
    #[instrument(skip_all, fields(frontend = %frontend, backend = %backend))]
    pub async fn connect(frontend: &Transport, backend: &Transport) -> Result<Self, TransportError> {
        let mut publisher = PubSocket::new();
        publisher.connect(&frontend.endpoint()).await?;

        let mut subscriber = SubSocket::new();
        subscriber.connect(&backend.endpoint()).await?;

        Ok(Self {
            publisher: Mutex::new(publisher),
            subscriber: Arc::new(Mutex::new(subscriber)),
            stop: Arc::new(Notify::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    fn decode_envelope(zmq_msg: &ZmqMessage) -> Option<CoreMessage> {
        let frames: Vec<_> = zmq_msg.iter().collect();
        let bytes = if frames.len() >= 2 {
            frames[1].as_ref()
        } else {
            frames.first()?.as_ref()
        };
        let envelope = Message::from_bytes(bytes).ok()?;
        envelope.decode::<CoreMessage>().ok()
    }
}

#[async_trait]
impl PubSub for ZmqPubSub {
    async fn publish(&self, topic: &str, message: CoreMessage) -> Result<(), RulesError> {
        let envelope = Message::new(topic, &message).map_err(TransportError::from)?;
        let bytes = envelope.to_bytes().map_err(TransportError::from)?;

        let mut zmq_msg = ZmqMessage::from(topic);
        zmq_msg.push_back(bytes.into());

        let mut socket = self.publisher.lock().await;
        socket
            .send(zmq_msg)
            .await
            .map_err(TransportError::from)?;
        debug!(topic = %topic, "published message");
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<(), RulesError> {
        {
            let mut sub = self.subscriber.lock().await;
            sub.subscribe(topic)
                .await
                .map_err(TransportError::from)?;
        }

        let subscriber = self.subscriber.clone();
        let stop = self.stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                let recv = async {
                    let mut sub = subscriber.lock().await;
                    sub.recv().await
                };
                tokio::select! {
                    _ = stop.notified() => break,
                    result = recv => match result {
                        Ok(zmq_msg) => {
                            if let Some(message) = ZmqPubSub::decode_envelope(&zmq_msg) {
                                handler(message).await;
                            }
                        }
                        Err(err) => warn!(error = %err, "subscription recv failed"),
                    },
                }
            }
        });

        self.tasks.lock().await.push(handle);
        Ok(())
    }

    async fn close(&self) -> Result<(), RulesError> {
        self.stop.notify_waiters();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }
}
