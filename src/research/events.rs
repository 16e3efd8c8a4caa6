//! Progress events emitted during a session.

use crate::research::types::{FindingStatus, TerminationVerdict};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        session_id: Uuid,
        question: String,
    },
    RoundOpened {
        round: u32,
    },
    Reflected {
        round: u32,
        thought: String,
    },
    Dispatched {
        round: u32,
        topics: Vec<String>,
    },
    FindingMerged {
        round: u32,
        topic: String,
        status: FindingStatus,
        documents_selected: usize,
    },
    RoundSealed {
        round: u32,
        findings: usize,
        new_documents: usize,
    },
    Terminated {
        verdict: TerminationVerdict,
    },
    ReportReady {
        session_id: Uuid,
    },
}

/// Optional event sink; a closed or absent receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub fn emit(&self, event: SessionEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
