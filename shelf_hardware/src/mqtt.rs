//! MQTT transport on top of `rumqttc`'s blocking client.
//!
//! Each session owns one network thread that drives the rumqttc connection,
//! pushes inbound publishes into a bounded channel and tracks session state
//! in an atomic flag. The control loop only ever touches the channel and the
//! flag, so it never blocks on the network.
//!
//! The thread exits on the first connection error; reconnecting is the
//! caller's decision.
use crossbeam_channel as xch;
use rumqttc::{Client, Event, LastWill, MqttOptions, Packet, QoS};
use shelf_traits::{InboundMessage, SessionParams};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::HwError;

/// Inbound messages buffered between two control-loop ticks.
const INBOUND_CAPACITY: usize = 32;
/// Outbound requests rumqttc may queue before `try_publish` fails.
const REQUEST_CAPACITY: usize = 16;

pub struct MqttTransport {
    client: Option<Client>,
    rx: Option<xch::Receiver<InboundMessage>>,
    connected: Arc<AtomicBool>,
    /// Join handle of the current session's network thread
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MqttTransport {
    pub fn new() -> Self {
        Self {
            client: None,
            rx: None,
            connected: Arc::new(AtomicBool::new(false)),
            join_handle: None,
        }
    }

    /// Ask the current session to close. The network thread exits on its own
    /// once rumqttc reports the closed request channel.
    fn teardown(&mut self) {
        self.connected.store(false, Ordering::Relaxed);
        if let Some(client) = self.client.as_mut() {
            let _ = client.disconnect();
        }
        self.client = None;
        self.rx = None;
        // Detach: a thread stuck in TCP connect must not stall the control loop.
        self.join_handle = None;
    }
}

impl shelf_traits::Transport for MqttTransport {
    fn connect(
        &mut self,
        params: &SessionParams,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.teardown();

        let mut opts = MqttOptions::new(
            params.client_id.clone(),
            params.addr.to_string(),
            params.port,
        );
        opts.set_keep_alive(params.keep_alive);
        opts.set_clean_session(true);
        if let Some(will) = &params.will {
            opts.set_last_will(LastWill::new(
                will.topic.clone(),
                will.payload.clone(),
                QoS::AtMostOnce,
                false,
            ));
        }

        let (client, mut connection) = Client::new(opts, REQUEST_CAPACITY);
        let (tx, rx) = xch::bounded::<InboundMessage>(INBOUND_CAPACITY);
        let (ready_tx, ready_rx) = xch::bounded::<Result<(), String>>(1);
        // Fresh flag per session so a lingering thread cannot flip the new one.
        let connected = Arc::new(AtomicBool::new(false));
        let connected_clone = connected.clone();

        let join_handle = std::thread::Builder::new()
            .name("mqtt-net".into())
            .spawn(move || {
                for notification in connection.iter() {
                    match notification {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            connected_clone.store(true, Ordering::Relaxed);
                            let _ = ready_tx.try_send(Ok(()));
                        }
                        Ok(Event::Incoming(Packet::Publish(p))) => {
                            let msg = InboundMessage::new(p.topic.clone(), p.payload.to_vec());
                            if tx.try_send(msg).is_err() {
                                tracing::warn!(topic = %p.topic, "inbound buffer full, dropping message");
                            }
                        }
                        Ok(Event::Incoming(Packet::Disconnect)) => {
                            tracing::debug!("broker closed the session");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            let _ = ready_tx.try_send(Err(e.to_string()));
                            tracing::debug!(error = %e, "mqtt connection ended");
                            break;
                        }
                    }
                }
                connected_clone.store(false, Ordering::Relaxed);
                tracing::trace!("mqtt network thread exiting");
            })
            .map_err(HwError::Io)?;

        match ready_rx.recv_timeout(params.connect_timeout) {
            Ok(Ok(())) => {
                self.client = Some(client);
                self.rx = Some(rx);
                self.connected = connected;
                self.join_handle = Some(join_handle);
                Ok(())
            }
            Ok(Err(msg)) => Err(Box::new(HwError::Session(msg))),
            Err(_) => {
                let _ = client.disconnect();
                Err(Box::new(HwError::Timeout))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.connected.load(Ordering::Relaxed)
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.as_mut().ok_or(HwError::NotConnected)?;
        client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| HwError::Session(e.to_string()))?;
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let client = self.client.as_mut().ok_or(HwError::NotConnected)?;
        client
            .try_publish(topic, QoS::AtMostOnce, retain, payload.to_vec())
            .map_err(|e| HwError::Session(e.to_string()))?;
        Ok(())
    }

    fn poll(&mut self) -> Vec<InboundMessage> {
        match &self.rx {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        }
    }

    fn disconnect(&mut self) {
        self.teardown();
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::Relaxed);
        if let Some(client) = self.client.as_mut() {
            let _ = client.disconnect();
        }
        // Dropping the client closes rumqttc's request channel, which ends
        // the connection iterator.
        self.client = None;
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => {
                    tracing::trace!("mqtt network thread joined");
                }
                Err(e) => {
                    tracing::warn!(?e, "mqtt network thread panicked during shutdown");
                }
            }
        }
    }
}
