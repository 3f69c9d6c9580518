use crate::commandline::MqttFormat;
use anyhow::{Context, Result};
use bmslink_lib::sink::{Metadata, Sink};
use rumqttc::{Client, MqttOptions, QoS};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    host: String,
    #[serde(default = "MqttConfig::default_port")]
    port: u16,
    username: Option<String>,
    password: Option<String>,
    #[serde(default = "MqttConfig::default_topic")]
    topic: String,
    #[serde(default = "MqttConfig::default_qos")]
    qos: u8,
    #[serde(default = "MqttConfig::default_client_id")]
    client_id: String,
    #[serde(
        default = "MqttConfig::default_keep_alive_interval",
        with = "humantime_serde"
    )]
    keep_alive_interval: Duration,
    #[serde(
        default = "MqttConfig::default_reconnect_interval",
        with = "humantime_serde"
    )]
    reconnect_interval: Duration,
}

impl MqttConfig {
    fn default_port() -> u16 {
        1883
    }

    fn default_topic() -> String {
        "bmslink".into()
    }

    fn default_qos() -> u8 {
        0
    }

    fn generate_random_string(len: usize) -> String {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    fn default_client_id() -> String {
        format!("bmslink-{}", Self::generate_random_string(8))
    }

    fn default_keep_alive_interval() -> Duration {
        Duration::from_secs(30)
    }

    fn default_reconnect_interval() -> Duration {
        Duration::from_secs(5)
    }

    pub const DEFAULT_CONFIG_FILE: &str = "mqtt.yaml";

    pub fn load(config_file_path: &str) -> Result<Self> {
        log::debug!("Loading config file from {config_file_path:?}");
        let config_file = std::fs::File::open(config_file_path)
            .with_context(|| format!("Cannot open MQTT config file {config_file_path:?}"))?;
        let config: Self = serde_yaml::from_reader(&config_file)
            .with_context(|| format!("Cannot read MQTT config from file: {config_file_path:?}"))?;
        Ok(config)
    }

    fn qos(&self) -> QoS {
        match self.qos {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }

    /// Creates the client and drives its connection on a background thread,
    /// which also takes care of reconnecting.
    pub fn create_client(&self) -> Result<Client> {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options
            .set_keep_alive(self.keep_alive_interval)
            .set_clean_session(true);
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.clone().unwrap_or_default());
        }

        log::info!(
            "Attempting to connect to MQTT broker: {}:{} with client_id: {}",
            self.host,
            self.port,
            self.client_id
        );
        let (client, mut connection) = Client::new(options, 10);
        let reconnect_interval = self.reconnect_interval;
        std::thread::Builder::new()
            .name("mqtt-connection".into())
            .spawn(move || {
                for notification in connection.iter() {
                    match notification {
                        Ok(event) => log::trace!("MQTT event: {event:?}"),
                        Err(err) => {
                            log::error!("MQTT connection error: {err}");
                            std::thread::sleep(reconnect_interval);
                        }
                    }
                }
            })
            .with_context(|| "Cannot start MQTT connection thread")?;
        Ok(client)
    }
}

/// Publishes every value to `<topic>/<name>`, or all values of a cycle as
/// one JSON document to `<topic>`.
pub struct MqttSink {
    client: Client,
    config: MqttConfig,
    format: MqttFormat,
    pending: serde_json::Map<String, serde_json::Value>,
}

impl MqttSink {
    pub fn new(config: MqttConfig, format: MqttFormat) -> Result<Self> {
        let client = config.create_client()?;
        Ok(Self {
            client,
            config,
            format,
            pending: serde_json::Map::new(),
        })
    }

    fn publish(&mut self, topic: &str, payload: String) -> bmslink_lib::Result<()> {
        log::debug!(
            "Publishing to MQTT: Topic='{}', Payload='{payload}', QoS={}",
            topic,
            self.config.qos
        );
        self.client
            .publish(topic, self.config.qos(), false, payload)
            .map_err(|err| {
                bmslink_lib::Error::Sink(format!("Failed to publish to MQTT topic {topic}: {err}"))
            })
    }

    fn record(&mut self, name: &str, value: serde_json::Value) -> bmslink_lib::Result<()> {
        match self.format {
            MqttFormat::Json => {
                self.pending.insert(name.to_string(), value);
                Ok(())
            }
            MqttFormat::Simple => {
                let topic = format!("{}/{name}", self.config.topic);
                let payload = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                self.publish(&topic, payload)
            }
        }
    }
}

impl Sink for MqttSink {
    fn publish_numeric(
        &mut self,
        name: &str,
        value: f64,
        _unit: &str,
        _metadata: &Metadata,
    ) -> bmslink_lib::Result<()> {
        self.record(name, json!(value))
    }

    fn publish_boolean(
        &mut self,
        name: &str,
        value: bool,
        _metadata: &Metadata,
    ) -> bmslink_lib::Result<()> {
        self.record(name, json!(value))
    }

    fn publish_event(&mut self, name: &str, value: &str) -> bmslink_lib::Result<()> {
        self.record(name, json!(value))
    }

    fn flush(&mut self) -> bmslink_lib::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut document = std::mem::take(&mut self.pending);
        document.insert(
            "timestamp".to_string(),
            json!(chrono::Utc::now().to_rfc3339()),
        );
        let payload = serde_json::to_string(&document)
            .map_err(|err| bmslink_lib::Error::Sink(format!("Cannot serialize values: {err}")))?;
        let topic = self.config.topic.clone();
        self.publish(&topic, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_test() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "host: broker.local\nusername: bms\npassword: secret\nqos: 1\nkeep_alive_interval: 1m"
        )
        .unwrap();
        let config = MqttConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.host, "broker.local");
        assert_eq!(config.port, 1883);
        assert_eq!(config.topic, "bmslink");
        assert_eq!(config.qos(), QoS::AtLeastOnce);
        assert_eq!(config.keep_alive_interval, Duration::from_secs(60));
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert!(config.client_id.starts_with("bmslink-"));
        assert_eq!(config.client_id.len(), "bmslink-".len() + 8);
    }

    #[test]
    fn load_missing_host_test() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "topic: battery").unwrap();
        assert!(MqttConfig::load(file.path().to_str().unwrap()).is_err());
        assert!(MqttConfig::load("/nonexistent/mqtt.yaml").is_err());
    }
}
