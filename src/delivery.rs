//! The Delivery Pump.
//!
//! Committed entries (and snapshot installations) are handed to the host
//! through a single ordered channel. The pump never blocks RPC or timer
//! processing: draining happens in a task separate from the mutex-guarded
//! core, woken by a commit-advance signal rather than holding the lock while
//! sending.

use tokio::sync::mpsc;

use crate::types::{Command, LogIndex, Term};

/// One message per commit, delivered in strictly ascending index order
/// (invariant 6). A `Snapshot` delivery atomically subsumes the prefix of
/// entries it covers; no `Entry` delivery for an index `<=` a delivered
/// snapshot's `last_included_index` will ever follow it out of order.
#[derive(Debug, Clone)]
pub enum Delivered<C: Command> {
    Entry { index: LogIndex, term: Term, command: C },
    Snapshot { data: Vec<u8> },
}

pub type DeliverySender<C> = mpsc::UnboundedSender<Delivered<C>>;
pub type DeliveryReceiver<C> = mpsc::UnboundedReceiver<Delivered<C>>;

/// Creates the host-facing delivery channel. The receiving half is handed to
/// the host; the sending half is retained by the core's delivery pump.
pub fn channel<C: Command>() -> (DeliverySender<C>, DeliveryReceiver<C>) {
    mpsc::unbounded_channel()
}
