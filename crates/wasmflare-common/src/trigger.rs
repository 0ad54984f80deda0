//! Invocation trigger kinds.
//!
//! The generated script exports one entry point per trigger kind, and each
//! entry point forwards to one binding method on the instantiated module.
//! Both names are part of the contract between the shim and the module.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The platform event that started an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Request/response handling on a worker.
    Fetch,
    /// Scheduled (cron) event.
    Scheduled,
    /// Batch of queue messages.
    Queue,
    /// Request routed through Pages functions.
    PagesRequest,
}

impl TriggerKind {
    /// All trigger kinds, in export order.
    pub const ALL: [TriggerKind; 4] = [
        TriggerKind::Fetch,
        TriggerKind::Scheduled,
        TriggerKind::Queue,
        TriggerKind::PagesRequest,
    ];

    /// Name of the exported entry point in the generated script.
    pub fn entry_point(self) -> &'static str {
        match self {
            TriggerKind::Fetch => "fetch",
            TriggerKind::Scheduled => "scheduled",
            TriggerKind::Queue => "queue",
            TriggerKind::PagesRequest => "onRequest",
        }
    }

    /// Name of the binding method the module must publish before readiness.
    pub fn binding(self) -> &'static str {
        match self {
            TriggerKind::Fetch | TriggerKind::PagesRequest => "handleRequest",
            TriggerKind::Scheduled => "runScheduler",
            TriggerKind::Queue => "handleQueueMessageBatch",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_point())
    }
}

impl FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch" => Ok(TriggerKind::Fetch),
            "scheduled" => Ok(TriggerKind::Scheduled),
            "queue" => Ok(TriggerKind::Queue),
            "pages" | "onRequest" => Ok(TriggerKind::PagesRequest),
            other => Err(format!(
                "unknown trigger '{other}' (expected fetch, scheduled, queue or pages)"
            )),
        }
    }
}
