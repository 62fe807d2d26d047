//! Signal replication between session participants.
//!
//! Interactions and progress signals are applied locally first, then queued
//! as [`SignalEnvelope`]s for the transport. The transport delivers
//! at-least-once with no ordering guarantee, so receivers run every envelope
//! through a [`DeliveryLog`] and apply each `(origin, sequence)` pair once.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use script_events::{EntityRef, Signal, Vec3};

/// What the envelope asks the receiver to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalKind {
    /// Full interaction fan-out: interaction triggers, then tasks.
    Interaction {
        /// World position of the interaction target, resolved by the sender.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Vec3>,
    },
    /// Task progress only.
    Progress,
}

/// One replicated signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub origin: Uuid,
    /// Per-origin sequence number, starting at 1.
    pub sequence: u64,
    #[serde(flatten)]
    pub kind: SignalKind,
    pub signal: Signal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<EntityRef>,
}

impl SignalEnvelope {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Numbers outgoing envelopes for one participant.
#[derive(Debug, Clone)]
pub struct Outbox {
    origin: Uuid,
    next_sequence: u64,
    queued: Vec<SignalEnvelope>,
}

impl Outbox {
    pub fn new(origin: Uuid) -> Self {
        Self {
            origin,
            next_sequence: 1,
            queued: Vec::new(),
        }
    }

    pub fn origin(&self) -> Uuid {
        self.origin
    }

    pub fn push(&mut self, kind: SignalKind, signal: Signal, actor: Option<EntityRef>) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queued.push(SignalEnvelope {
            origin: self.origin,
            sequence,
            kind,
            signal,
            actor,
        });
        sequence
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Hands every queued envelope to the caller.
    pub fn drain(&mut self) -> Vec<SignalEnvelope> {
        std::mem::take(&mut self.queued)
    }
}

#[derive(Debug, Clone, Default)]
struct OriginLog {
    /// Every sequence up to and including this one has been seen.
    contiguous: u64,
    ahead: BTreeSet<u64>,
    lost: u64,
}

/// Duplicate suppression per origin.
///
/// Memory per origin is bounded by `window`: once more than `window`
/// sequences are held ahead of a gap, the gap is treated as lost and the
/// watermark jumps forward.
#[derive(Debug, Clone)]
pub struct DeliveryLog {
    window: usize,
    origins: HashMap<Uuid, OriginLog>,
}

impl DeliveryLog {
    /// Creates a log holding at most `window` out-of-order sequences per
    /// origin.
    ///
    /// Skipping a gap is permanent: a sequence below the watermark is
    /// rejected as a duplicate even if this is its first delivery. See
    /// [`DeliveryLog::lost`].
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            origins: HashMap::new(),
        }
    }

    /// Returns true the first time `(origin, sequence)` is offered.
    pub fn accept(&mut self, origin: Uuid, sequence: u64) -> bool {
        let log = self.origins.entry(origin).or_default();
        if sequence <= log.contiguous || log.ahead.contains(&sequence) {
            return false;
        }

        log.ahead.insert(sequence);
        while log.ahead.remove(&(log.contiguous + 1)) {
            log.contiguous += 1;
        }
        while log.ahead.len() > self.window {
            if let Some(lowest) = log.ahead.pop_first() {
                let skipped = lowest - log.contiguous - 1;
                log.lost += skipped;
                tracing::warn!(
                    "Giving up on sequences {}..{} from {} ({} envelopes held ahead, {} lost so far)",
                    log.contiguous + 1,
                    lowest,
                    origin,
                    log.ahead.len() + 1,
                    log.lost
                );
                log.contiguous = lowest;
                while log.ahead.remove(&(log.contiguous + 1)) {
                    log.contiguous += 1;
                }
            }
        }
        true
    }

    /// Highest sequence from `origin` below which nothing is missing.
    pub fn watermark(&self, origin: Uuid) -> u64 {
        self.origins.get(&origin).map(|l| l.contiguous).unwrap_or(0)
    }

    /// Number of sequences from `origin` skipped over without ever arriving.
    pub fn lost(&self, origin: Uuid) -> u64 {
        self.origins.get(&origin).map(|l| l.lost).unwrap_or(0)
    }

    pub fn forget(&mut self, origin: Uuid) {
        self.origins.remove(&origin);
    }
}
