use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// The stages a payment flow dispatches through, in flow order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStage {
    PreFlow,
    Split,
    PreTransaction,
    PostCardReading,
    PostTransaction,
    PostFlow,
}

impl FlowStage {
    /// All stages in dispatch order.
    pub const ALL: [FlowStage; 6] = [
        FlowStage::PreFlow,
        FlowStage::Split,
        FlowStage::PreTransaction,
        FlowStage::PostCardReading,
        FlowStage::PostTransaction,
        FlowStage::PostFlow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStage::PreFlow => "PRE_FLOW",
            FlowStage::Split => "SPLIT",
            FlowStage::PreTransaction => "PRE_TRANSACTION",
            FlowStage::PostCardReading => "POST_CARD_READING",
            FlowStage::PostTransaction => "POST_TRANSACTION",
            FlowStage::PostFlow => "POST_FLOW",
        }
    }
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowStage {
    type Err = CodecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PRE_FLOW" => Ok(FlowStage::PreFlow),
            "SPLIT" => Ok(FlowStage::Split),
            "PRE_TRANSACTION" => Ok(FlowStage::PreTransaction),
            "POST_CARD_READING" => Ok(FlowStage::PostCardReading),
            "POST_TRANSACTION" => Ok(FlowStage::PostTransaction),
            "POST_FLOW" => Ok(FlowStage::PostFlow),
            other => Err(CodecError::UnknownStage {
                stage: other.to_string(),
            }),
        }
    }
}
