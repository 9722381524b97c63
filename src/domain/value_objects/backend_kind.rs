//! BackendKind value object
//! Identifies the proxy technology behind a backend

use serde::{Deserialize, Serialize};
use std::fmt;

/// Proxy technology of a managed backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Shadowsocks,
    Trojan,
    Snell,
}

impl BackendKind {
    /// Parse from the control-plane string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "shadowsocks" | "ss" => Some(BackendKind::Shadowsocks),
            "trojan" => Some(BackendKind::Trojan),
            "snell" => Some(BackendKind::Snell),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Shadowsocks => write!(f, "shadowsocks"),
            BackendKind::Trojan => write!(f, "trojan"),
            BackendKind::Snell => write!(f, "snell"),
        }
    }
}
