//! Ordering for concurrent re-syncs.
//!
//! Every re-sync draws a ticket when it starts. When it is ready to publish, the sequencer
//! accepts the result only if no re-sync with a later ticket has published already, so the
//! snapshot never moves back to an older view of the provider regardless of how the
//! re-syncs were scheduled.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Issues re-sync tickets and tracks which one was published last
#[derive(Debug, Default)]
pub struct ResyncSequencer {
    /// Last ticket handed out
    issued: AtomicU64,
    /// Ticket of the last accepted publish
    applied: AtomicU64,
    /// Publishes accepted
    published: AtomicU64,
    /// Publishes rejected because a newer one had been applied
    discarded: AtomicU64,
}

impl ResyncSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the ticket for a new re-sync. Tickets start at 1.
    pub fn next_ticket(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decide whether the result of re-sync `ticket` may be published.
    ///
    /// Callers must hold the publication lock while calling this so that the decision and the
    /// publish happen together.
    pub fn try_accept(&self, ticket: u64) -> bool {
        let applied = self.applied.load(Ordering::SeqCst);
        if ticket <= applied {
            self.discarded.fetch_add(1, Ordering::SeqCst);
            debug!(
                "Discarding re-sync #{} result, #{} already published",
                ticket, applied
            );
            return false;
        }
        self.applied.store(ticket, Ordering::SeqCst);
        self.published.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Get sequencing statistics
    pub fn stats(&self) -> SequenceStats {
        SequenceStats {
            issued: self.issued.load(Ordering::SeqCst),
            applied: self.applied.load(Ordering::SeqCst),
            published: self.published.load(Ordering::SeqCst),
            discarded: self.discarded.load(Ordering::SeqCst),
        }
    }
}

/// Snapshot of the sequencer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceStats {
    pub issued: u64,
    pub applied: u64,
    pub published: u64,
    pub discarded: u64,
}

impl SequenceStats {
    /// Re-syncs that started but have neither published nor been discarded.
    pub fn in_flight(&self) -> u64 {
        self.issued
            .saturating_sub(self.published)
            .saturating_sub(self.discarded)
    }

    /// Every issued re-sync has either published or been discarded.
    pub fn settled(&self) -> bool {
        self.in_flight() == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} re-syncs issued, {} published (last #{}), {} stale results discarded",
            self.issued, self.published, self.applied, self.discarded
        )
    }
}
