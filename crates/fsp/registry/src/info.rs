use serde::{Deserialize, Serialize};

use fsp_types::FlowStage;

use crate::error::RegistryError;

/// Descriptive model of an installed flow service.
///
/// Everything here is advertisement for coordinators and UIs; none of it is
/// interpreted by the protocol core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowServiceInfo {
    pub id: String,
    pub vendor: String,
    pub version: String,
    pub display_name: String,
    #[serde(default)]
    pub stages: Vec<FlowStage>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub supported_request_types: Vec<String>,
    #[serde(default)]
    pub supported_data_keys: Vec<String>,
    #[serde(default)]
    pub supports_accessibility_mode: bool,
}

impl FlowServiceInfo {
    pub fn builder(id: impl Into<String>) -> FlowServiceInfoBuilder {
        FlowServiceInfoBuilder::new(id)
    }

    pub fn serves_stage(&self, stage: FlowStage) -> bool {
        self.stages.contains(&stage)
    }
}

/// Builder for [`FlowServiceInfo`].
#[derive(Clone, Debug, Default)]
pub struct FlowServiceInfoBuilder {
    id: String,
    vendor: Option<String>,
    version: Option<String>,
    display_name: Option<String>,
    stages: Vec<FlowStage>,
    capabilities: Vec<String>,
    supported_request_types: Vec<String>,
    supported_data_keys: Vec<String>,
    supports_accessibility_mode: bool,
}

impl FlowServiceInfoBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_stages(mut self, stages: impl IntoIterator<Item = FlowStage>) -> Self {
        self.stages = stages.into_iter().collect();
        self
    }

    pub fn with_capabilities<S: Into<String>>(
        mut self,
        capabilities: impl IntoIterator<Item = S>,
    ) -> Self {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_supported_request_types<S: Into<String>>(
        mut self,
        request_types: impl IntoIterator<Item = S>,
    ) -> Self {
        self.supported_request_types = request_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_supported_data_keys<S: Into<String>>(
        mut self,
        data_keys: impl IntoIterator<Item = S>,
    ) -> Self {
        self.supported_data_keys = data_keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_accessibility_mode(mut self, supported: bool) -> Self {
        self.supports_accessibility_mode = supported;
        self
    }

    /// Validate and build. Vendor, version and display name must be set.
    pub fn build(self) -> Result<FlowServiceInfo, RegistryError> {
        let require = |field: Option<String>, name: &str| {
            field.ok_or_else(|| RegistryError::InvalidServiceInfo {
                detail: format!("{name} must be set"),
            })
        };

        if self.id.is_empty() {
            return Err(RegistryError::InvalidServiceInfo {
                detail: "id must not be empty".to_string(),
            });
        }

        Ok(FlowServiceInfo {
            vendor: require(self.vendor, "vendor")?,
            version: require(self.version, "version")?,
            display_name: require(self.display_name, "display name")?,
            id: self.id,
            stages: self.stages,
            capabilities: self.capabilities,
            supported_request_types: self.supported_request_types,
            supported_data_keys: self.supported_data_keys,
            supports_accessibility_mode: self.supports_accessibility_mode,
        })
    }
}
