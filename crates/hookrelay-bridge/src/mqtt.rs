//! MQTT adapter built on `rumqttc`.
//!
//! `connect` blocks until the broker acknowledges the session so that a bad
//! address or refused credentials fail startup. Afterwards a background task
//! polls the event loop and forwards publishes to the router.
//!
//! The event loop is polled continuously, also while the router is blocked
//! on a full delivery queue, so keep-alive pings keep flowing during a long
//! rate-limit stall. Publishes are acknowledged manually once the router has
//! taken them, which leaves the broker's in-flight window to bound how many
//! messages wait here. Polling also continues after the router stops
//! listening, which is what lets the final status publish and the DISCONNECT
//! packet reach the broker.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use bytes::Bytes;
use hookrelay_core::ServerConfig;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, LastWill, MqttOptions,
    Outgoing, Packet, Publish,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    broker::{
        Broker, BrokerEvent, BrokerEvents, InboundMessage, QoS, EVENT_CHANNEL_CAPACITY,
        STATUS_OFFLINE,
    },
    error::{BridgeError, Result},
};

/// Keep-alive interval negotiated with the broker.
pub const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Upper bound on waiting for CONNACK.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const REQUEST_CHANNEL_CAPACITY: usize = 16;

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::AtMostOnce,
            QoS::AtLeastOnce => Self::AtLeastOnce,
            QoS::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

/// Broker connection backed by a `rumqttc` client.
#[derive(Debug)]
pub struct MqttBroker {
    client: AsyncClient,
    address: String,
    disconnecting: Arc<AtomicBool>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBroker {
    /// Connects and waits for the broker's acknowledgement.
    ///
    /// Returns the broker handle and the channel on which inbound messages
    /// arrive.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` for an unusable address and
    /// `BridgeError::BrokerConnect` if the broker is unreachable, refuses
    /// the session, or does not answer within `CONNECT_TIMEOUT`.
    pub async fn connect(config: &ServerConfig) -> Result<(Self, BrokerEvents)> {
        let (host, port) = config.broker_endpoint()?;

        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        options.set_manual_acks(true);
        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }
        if let Some(status_topic) = config.status_topic() {
            options.set_last_will(LastWill::new(
                status_topic,
                STATUS_OFFLINE,
                rumqttc::QoS::AtLeastOnce,
                true,
            ));
        }

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, wait_for_connack(&mut event_loop, &config.address))
            .await
            .map_err(|_| {
                BridgeError::broker_connect(&config.address, "timed out waiting for CONNACK")
            })??;

        info!(address = %config.address, client_id = %config.client_id, "connected to broker");

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let disconnecting = Arc::new(AtomicBool::new(false));
        let session = Session { event_loop, client: client.clone() };
        let event_task = tokio::spawn(forward_events(session, events_tx, disconnecting.clone()));

        let broker = Self {
            client,
            address: config.address.clone(),
            disconnecting,
            event_task: Mutex::new(Some(event_task)),
        };

        Ok((broker, events_rx))
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop, address: &str) -> Result<()> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(BridgeError::broker_connect(
                    address,
                    format!("connection refused: {:?}", ack.code),
                ));
            },
            Ok(_) => {},
            Err(e) => return Err(BridgeError::broker_connect(address, e.to_string())),
        }
    }
}

/// What the forwarding task needs from an MQTT session.
#[async_trait::async_trait]
trait EventSource: Send {
    async fn next_event(&mut self) -> std::result::Result<Event, ConnectionError>;

    /// Queues the acknowledgement for `publish`; `false` if it must be retried.
    fn try_ack(&self, publish: &Publish) -> bool;
}

struct Session {
    event_loop: EventLoop,
    client: AsyncClient,
}

#[async_trait::async_trait]
impl EventSource for Session {
    async fn next_event(&mut self) -> std::result::Result<Event, ConnectionError> {
        self.event_loop.poll().await
    }

    fn try_ack(&self, publish: &Publish) -> bool {
        self.client.try_ack(publish).is_ok()
    }
}

/// Polls the event loop until disconnect or failure.
///
/// Publishes wait in `pending` until the router channel has room; polling
/// goes on meanwhile. `EventLoop::poll` is cancel safe, so losing the race
/// against `reserve` drops nothing. Handing off first keeps a closed router
/// channel from racing ahead of the acknowledgements.
async fn forward_events<S: EventSource>(
    mut source: S,
    events: mpsc::Sender<BrokerEvent>,
    disconnecting: Arc<AtomicBool>,
) {
    let mut pending: VecDeque<Publish> = VecDeque::new();
    let mut unacked: VecDeque<Publish> = VecDeque::new();
    let mut forwarding = true;

    loop {
        while let Some(publish) = unacked.front() {
            if !source.try_ack(publish) {
                break;
            }
            unacked.pop_front();
        }

        let polled = tokio::select! {
            biased;

            permit = events.reserve(), if !pending.is_empty() => {
                match (permit, pending.pop_front()) {
                    (Ok(permit), Some(publish)) => {
                        let message =
                            InboundMessage::new(publish.topic.clone(), publish.payload.clone());
                        permit.send(BrokerEvent::Message(message));
                        unacked.push_back(publish);
                    },
                    (Err(_), publish) => {
                        debug!("router stopped, dropping pending messages");
                        forwarding = false;
                        unacked.extend(publish);
                        unacked.extend(pending.drain(..));
                    },
                    (Ok(_), None) => {},
                }
                continue;
            },
            polled = source.next_event() => polled,
        };

        match polled {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if forwarding {
                    pending.push_back(publish);
                } else {
                    debug!(topic = %publish.topic, "router stopped, dropping message");
                    unacked.push_back(publish);
                }
            },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("disconnect sent");
                break;
            },
            Ok(_) => {},
            Err(e) => {
                if disconnecting.load(Ordering::Acquire) {
                    debug!("event loop closed after disconnect: {}", e);
                } else {
                    warn!("broker connection lost: {}", e);
                    let _ = events.send(BrokerEvent::ConnectionLost(e.to_string())).await;
                }
                break;
            },
        }
    }
}

#[async_trait::async_trait]
impl Broker for MqttBroker {
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<()> {
        self.client
            .subscribe(filter, qos.into())
            .await
            .map_err(|e| BridgeError::broker("subscribe", e.to_string()))
    }

    async fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Bytes) -> Result<()> {
        self.client
            .publish(topic, qos.into(), retain, payload.to_vec())
            .await
            .map_err(|e| BridgeError::broker("publish", e.to_string()))
    }

    async fn disconnect(&self, grace: Duration) -> Result<()> {
        self.disconnecting.store(true, Ordering::Release);
        self.client
            .disconnect()
            .await
            .map_err(|e| BridgeError::broker("disconnect", e.to_string()))?;

        let task = self.event_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut task) = task {
            if tokio::time::timeout(grace, &mut task).await.is_err() {
                warn!(
                    address = %self.address,
                    "broker did not settle before disconnect grace period"
                );
                task.abort();
            }
        }

        info!(address = %self.address, "disconnected from broker");
        Ok(())
    }
}
