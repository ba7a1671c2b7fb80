//! Local presence probes
//!
//! A probe answers two independent questions: is the screen locked, and is
//! the user in a meeting. Each query may fail on its own; the watcher decides
//! what a failure means, probes just report it.

pub mod system;

use crate::config::{ProbeBackend, ProbeConfig};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use system::SystemProbe;

#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn is_locked(&self) -> Result<bool>;
    async fn is_in_meeting(&self) -> Result<bool>;
}

/// Probe that always reports the same facts
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedProbe {
    pub locked: bool,
    pub meeting: bool,
}

#[async_trait]
impl StatusProbe for FixedProbe {
    async fn is_locked(&self) -> Result<bool> {
        Ok(self.locked)
    }

    async fn is_in_meeting(&self) -> Result<bool> {
        Ok(self.meeting)
    }
}

/// Build the probe selected in the config
pub fn from_config(config: &ProbeConfig) -> Arc<dyn StatusProbe> {
    match config.backend {
        ProbeBackend::System => Arc::new(SystemProbe::new(
            config.session_id.clone(),
            config.meeting_processes.clone(),
        )),
        ProbeBackend::Fixed => Arc::new(FixedProbe {
            locked: !config.working,
            meeting: config.meeting,
        }),
    }
}
