use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Well-known extension keys carried in [`InternalData::extensions`].
pub mod extensions {
    /// Set to `"true"` on a response from a service that keeps processing in
    /// the background and will not send any further data.
    pub const BACKGROUND_PROCESSING: &str = "backgroundProcessing";

    /// The flow stage a request is being dispatched for.
    pub const FLOW_STAGE: &str = "flowStage";
}

/// Sender identity and version metadata attached to envelopes.
///
/// The API version is immutable after construction. Extensions may be
/// appended by the owning side but never removed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalData {
    #[serde(rename = "apiVersion")]
    api_version: String,
    #[serde(rename = "senderId")]
    sender_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extensions: BTreeMap<String, String>,
}

impl InternalData {
    pub fn new(api_version: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            sender_id: sender_id.into(),
            extensions: BTreeMap::new(),
        }
    }

    /// Semantic version of the protocol/payload schema the sender implements.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Opaque identifier of the sending application.
    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Append a forward-compatibility flag. Existing keys are overwritten;
    /// there is deliberately no removal operation.
    pub fn add_extension(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extensions.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`add_extension`](Self::add_extension).
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_extension(key, value);
        self
    }

    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).map(String::as_str)
    }

    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.extensions
    }
}
