//! MQTT trigger for remote defeat effects
//!
//! Connects to an MQTT broker and subscribes to a topic. Each message becomes
//! a [`TriggerCommand`] forwarded to the main loop, which acts on it the same
//! way it acts on a click.
//!
//! Payloads are either a bare word (`defeat`, `trigger`, `reset`) or JSON:
//! `{"command": "defeat", "targets": [0, 2]}`.

use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 1883;
const DEFAULT_TOPIC: &str = "defeatfx";

/// Errors that can occur while connecting to the broker
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("failed to subscribe to topic '{topic}': {source}")]
    Subscribe {
        topic: String,
        source: rumqttc::ClientError,
    },
    #[error("failed to connect to MQTT broker at {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: rumqttc::ConnectionError,
    },
    #[error("failed to connect to MQTT broker at {host}:{port}: connection closed")]
    Closed { host: String, port: u16 },
}

/// What a trigger asks the effects to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerAction {
    /// Start the defeat effect
    #[serde(alias = "trigger")]
    Defeat,
    /// Re-arm with the original image
    Reset,
}

/// A parsed trigger message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TriggerCommand {
    #[serde(rename = "command")]
    pub action: TriggerAction,
    /// Sprite indices to act on; all of them when absent
    #[serde(default)]
    pub targets: Option<Vec<usize>>,
}

impl TriggerCommand {
    /// Parse a payload, JSON first, then a bare command word
    pub fn parse(payload: &str) -> Option<Self> {
        let text = payload.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(cmd) = serde_json::from_str::<Self>(text) {
            return Some(cmd);
        }
        let action = match text.to_lowercase().as_str() {
            "defeat" | "trigger" | "go" => TriggerAction::Defeat,
            "reset" | "rearm" => TriggerAction::Reset,
            _ => return None,
        };
        Some(Self {
            action,
            targets: None,
        })
    }

    /// Whether sprite `index` is addressed by this command
    pub fn targets(&self, index: usize) -> bool {
        self.targets.as_ref().map_or(true, |t| t.contains(&index))
    }
}

/// MQTT client that receives trigger commands in a background thread
pub struct TriggerListener {
    receiver: Receiver<TriggerCommand>,
    _thread: thread::JoinHandle<()>,
}

impl TriggerListener {
    /// Connect to the broker and subscribe.
    /// Fails immediately if connection cannot be established.
    pub fn connect(host: &str, topic: &str) -> Result<Self, TriggerError> {
        let host = if host.is_empty() { DEFAULT_HOST } else { host };
        let topic = if topic.is_empty() { DEFAULT_TOPIC } else { topic };

        let mut options = MqttOptions::new("defeatfx", host, DEFAULT_PORT);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut connection) = Client::new(options, 10);

        client
            .subscribe(topic, QoS::AtMostOnce)
            .map_err(|source| TriggerError::Subscribe {
                topic: topic.to_string(),
                source,
            })?;

        // Poll once so an unreachable broker fails here rather than in the thread
        match connection.iter().next() {
            Some(Ok(_)) => {},
            Some(Err(source)) => {
                return Err(TriggerError::Connect {
                    host: host.to_string(),
                    port: DEFAULT_PORT,
                    source,
                });
            },
            None => {
                return Err(TriggerError::Closed {
                    host: host.to_string(),
                    port: DEFAULT_PORT,
                });
            },
        }

        let (sender, receiver) = mpsc::channel();
        let topic_owned = topic.to_string();

        let handle = thread::spawn(move || {
            Self::message_loop(connection, sender, &topic_owned);
        });

        info!(host, port = DEFAULT_PORT, topic, "MQTT trigger connected");

        Ok(Self {
            receiver,
            _thread: handle,
        })
    }

    fn message_loop(
        mut connection: rumqttc::Connection,
        sender: Sender<TriggerCommand>,
        topic: &str,
    ) {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == topic => {
                    let Ok(text) = std::str::from_utf8(&publish.payload) else {
                        warn!("MQTT payload is not UTF-8, ignored");
                        continue;
                    };
                    match TriggerCommand::parse(text) {
                        Some(cmd) => {
                            if sender.send(cmd).is_err() {
                                // Main thread gone, exit
                                break;
                            }
                        },
                        None => warn!(payload = text, "unrecognized trigger payload"),
                    }
                },
                Ok(_) => {},
                Err(e) => {
                    // Keep going, rumqttc reconnects on the next poll
                    warn!(error = %e, "MQTT error");
                },
            }
        }
    }

    /// Drain every command received since the last poll (non-blocking)
    pub fn poll(&self) -> Vec<TriggerCommand> {
        self.receiver.try_iter().collect()
    }

    pub fn default_topic() -> &'static str {
        DEFAULT_TOPIC
    }
}
