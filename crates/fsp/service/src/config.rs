//! Configuration for a flow service instance.

use serde::{Deserialize, Serialize};

/// Configuration for one [`FlowService`](crate::FlowService).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Identifier this service reports as its sender id.
    pub service_id: String,

    /// API version attached to every envelope this service sends.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Stop the service after the first stream to a client has ended.
    ///
    /// The default is false: the instance stays up and is re-used for
    /// further requests.
    #[serde(default)]
    pub stop_on_end_of_stream: bool,

    /// Per-direction message buffer of each connection.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_api_version() -> String {
    fsp_types::API_VERSION.to_string()
}

fn default_channel_capacity() -> usize {
    64
}

impl ServiceConfig {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            api_version: default_api_version(),
            stop_on_end_of_stream: false,
            channel_capacity: default_channel_capacity(),
        }
    }

    /// Load configuration: defaults, then an optional file, then environment
    /// variables with the `FSP_` prefix.
    pub fn load(service_id: &str, path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&ServiceConfig::new(service_id))?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FSP")
                .separator("_")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn with_stop_on_end_of_stream(mut self, stop: bool) -> Self {
        self.stop_on_end_of_stream = stop;
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServiceConfig::new("com.example.flow");
        assert_eq!(config.service_id, "com.example.flow");
        assert_eq!(config.api_version, fsp_types::API_VERSION);
        assert!(!config.stop_on_end_of_stream);
        assert_eq!(config.channel_capacity, 64);
    }

    #[test]
    fn load_without_file_keeps_defaults() {
        let config = ServiceConfig::load("com.example.flow", None).unwrap();
        assert_eq!(config.service_id, "com.example.flow");
        assert!(!config.stop_on_end_of_stream);
    }
}
