use serde::Deserialize;

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "theaterd".to_string()
}

fn default_command_topic() -> String {
    "theaterd/ir/send".to_string()
}

fn default_light_topic_prefix() -> String {
    "zigbee2mqtt".to_string()
}

/// Configuration for the MQTT transport
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// MQTT broker hostname or IP address
    pub broker: String,

    /// MQTT broker port
    #[serde(default = "default_port")]
    pub port: u16,

    /// MQTT client ID
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Optional username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Topic the IR/RF blaster listens on for named commands
    #[serde(default = "default_command_topic")]
    pub command_topic: String,

    /// Base topic for lights and switches (Zigbee2MQTT layout)
    #[serde(default = "default_light_topic_prefix")]
    pub light_topic_prefix: String,
}
