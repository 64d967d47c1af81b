use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::MqttConfig;

pub type ClientError = Box<dyn Error + Send + Sync>;

/// Trait for MQTT client operations
///
/// Lets the sink be tested without a broker.
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Connect to the MQTT broker
    async fn connect(&mut self) -> Result<(), ClientError>;

    /// Publish a message to an MQTT topic at QoS 1
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), ClientError>;
}

/// Mock MQTT client for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockMqttClient {
    pub published: std::sync::Mutex<Vec<(String, Vec<u8>, bool)>>,
    pub is_connected: bool,
    pub fail_publish: bool,
}

#[cfg(test)]
#[async_trait]
impl MqttClient for MockMqttClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        self.is_connected = true;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), ClientError> {
        if self.fail_publish {
            return Err("broker unavailable".into());
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec(), retain));
        Ok(())
    }
}

#[cfg(test)]
impl MockMqttClient {
    /// Everything published so far, payloads decoded as JSON.
    pub fn published_json(&self) -> Vec<(String, serde_json::Value)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, payload, _)| (topic.clone(), serde_json::from_slice(payload).unwrap()))
            .collect()
    }
}

/// Real MQTT client implementation using rumqttc
pub struct RumqttcClient {
    /// MQTT connection options (stored for lazy initialization)
    mqtt_options: MqttOptions,

    /// AsyncClient (created in connect())
    client: Option<AsyncClient>,

    /// Background event loop task handle
    event_loop_task: Option<JoinHandle<()>>,
}

impl RumqttcClient {
    pub fn new(config: &MqttConfig) -> Self {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        Self {
            mqtt_options,
            client: None,
            event_loop_task: None,
        }
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options.clone(), 10);

        // rumqttc only makes progress while its event loop is polled, and
        // reconnects on its own after an error.
        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                    }
                    Ok(Event::Incoming(Packet::PubAck(ack))) => {
                        debug!("MQTT publish {} acknowledged", ack.pkid);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        self.client = Some(client);
        if let Some(previous) = self.event_loop_task.replace(task) {
            previous.abort();
        }

        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), ClientError> {
        let client = self.client.as_ref().ok_or_else(|| -> ClientError {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "MQTT client not connected. Call connect() first.",
            ))
        })?;

        client
            .publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .await?;

        Ok(())
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_before_connect_fails() {
        let config = MqttConfig {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "theaterd-test".to_string(),
            username: None,
            password: None,
            command_topic: "theaterd/ir/send".to_string(),
            light_topic_prefix: "zigbee2mqtt".to_string(),
        };
        let client = RumqttcClient::new(&config);

        let err = client.publish("test", b"{}", false).await.unwrap_err();
        assert!(err.to_string().contains("not connected"));
    }
}
