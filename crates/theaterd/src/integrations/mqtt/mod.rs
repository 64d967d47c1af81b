//! MQTT transport: IR/RF commands go to a blaster bridge, lights and switches
//! go to Zigbee2MQTT.

mod client;
mod config;
mod sink;

pub use client::MqttClient;
pub use client::RumqttcClient;
pub use config::Config as MqttConfig;
pub use sink::MqttSink;
