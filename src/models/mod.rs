pub mod activity;

pub use activity::{LeaderActivity, ProcessingMarker};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a fill. Wire formats are inconsistent about it: the data
/// API sends "BUY"/"SELL" strings while on-chain events encode 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Lenient parse of either wire form; `None` for anything else.
    pub fn from_api_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SELL" | "1" => Some(Side::Sell),
            "BUY" | "0" => Some(Side::Buy),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
