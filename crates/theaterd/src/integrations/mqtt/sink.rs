use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::client::MqttClient;
use super::MqttConfig;
use crate::coordinator::CommandSink;
use crate::coordinator::EntitySink;
use crate::coordinator::SinkError;

/// Named IR/RF command for the blaster bridge.
#[derive(Debug, Serialize)]
struct CommandPayload<'a> {
    device_id: &'a str,
    command_name: &'a str,
}

/// Zigbee2MQTT `set` payload.
#[derive(Debug, Serialize)]
struct SetPayload {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    brightness: Option<u8>,
}

/// Delivers coordinator commands and light changes over MQTT.
pub struct MqttSink<C: MqttClient> {
    client: C,
    command_topic: String,
    light_topic_prefix: String,
}

impl<C: MqttClient> MqttSink<C> {
    pub fn new(client: C, config: &MqttConfig) -> Self {
        Self {
            client,
            command_topic: config.command_topic.clone(),
            light_topic_prefix: config.light_topic_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// `light.living_room` -> `<prefix>/living_room/set`
    fn set_topic(&self, entity_id: &str) -> String {
        let object_id = entity_id
            .split_once('.')
            .map_or(entity_id, |(_, object_id)| object_id);
        format!("{}/{}/set", self.light_topic_prefix, object_id)
    }

    async fn publish_json<T: Serialize>(&self, topic: &str, payload: &T) -> Result<(), SinkError> {
        let payload = serde_json::to_vec(payload)?;
        debug!("Publishing to {}: {}", topic, String::from_utf8_lossy(&payload));
        self.client.publish(topic, &payload, false).await
    }
}

#[async_trait]
impl<C: MqttClient> CommandSink for MqttSink<C> {
    async fn send_command(&self, device_id: &str, command: &str) -> Result<(), SinkError> {
        let payload = CommandPayload {
            device_id,
            command_name: command,
        };
        self.publish_json(&self.command_topic, &payload).await
    }
}

#[async_trait]
impl<C: MqttClient> EntitySink for MqttSink<C> {
    async fn turn_on(&self, entity_id: &str, brightness: Option<u8>) -> Result<(), SinkError> {
        let payload = SetPayload {
            state: "ON",
            brightness,
        };
        self.publish_json(&self.set_topic(entity_id), &payload).await
    }

    async fn turn_off(&self, entity_id: &str) -> Result<(), SinkError> {
        let payload = SetPayload {
            state: "OFF",
            brightness: None,
        };
        self.publish_json(&self.set_topic(entity_id), &payload).await
    }
}
