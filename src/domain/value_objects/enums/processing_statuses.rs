use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessingStatus {
    #[default]
    Received,
    Applied,
    ParseFailed,
    ApplyFailed,
}

impl ProcessingStatus {
    pub fn from_str(value: &str) -> Self {
        match value {
            "APPLIED" => ProcessingStatus::Applied,
            "PARSE_FAILED" => ProcessingStatus::ParseFailed,
            "APPLY_FAILED" => ProcessingStatus::ApplyFailed,
            _ => ProcessingStatus::Received,
        }
    }
}

impl Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            ProcessingStatus::Received => "RECEIVED",
            ProcessingStatus::Applied => "APPLIED",
            ProcessingStatus::ParseFailed => "PARSE_FAILED",
            ProcessingStatus::ApplyFailed => "APPLY_FAILED",
        };
        write!(f, "{}", status)
    }
}
