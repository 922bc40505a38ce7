//! Cancellation for the capture loop: one root token per run, one child token
//! per capture cycle. Interrupting the root cancels the cycle in flight and
//! stops the loop; a cycle token never outlives its cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Interrupt {
    root: CancellationToken,
    generation: AtomicU64,
}

/// Token and sequence number for one capture cycle.
#[derive(Clone)]
pub struct CycleToken {
    token: CancellationToken,
    generation: u64,
}

impl CycleToken {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Interrupt {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Cancel the root token on the first Ctrl-C.
    pub fn listen_for_ctrl_c(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => match res {
                    Ok(()) => {
                        info!("interrupted");
                        this.interrupt();
                    }
                    Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
                },
                _ = this.root.cancelled() => {}
            }
        });
    }

    /// Child token for the next cycle, tagged with an increasing generation.
    pub fn next_cycle(&self) -> CycleToken {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        CycleToken {
            token: self.root.child_token(),
            generation,
        }
    }

    pub fn interrupt(&self) {
        self.root.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Resolves once the run has been interrupted.
    pub async fn interrupted(&self) {
        self.root.cancelled().await
    }

    /// Token cancelled together with the root, for long-lived clients.
    pub fn token(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_advance_generation() {
        let interrupt = Interrupt::new();
        assert_eq!(interrupt.next_cycle().generation(), 1);
        assert_eq!(interrupt.next_cycle().generation(), 2);
        assert_eq!(interrupt.current_generation(), 2);
    }

    #[test]
    fn interrupt_cancels_every_cycle_token() {
        let interrupt = Interrupt::new();
        let first = interrupt.next_cycle();
        let second = interrupt.next_cycle();
        let client = interrupt.token();
        assert!(!first.is_cancelled());

        interrupt.interrupt();

        assert!(interrupt.is_interrupted());
        assert!(first.is_cancelled() && second.is_cancelled());
        assert!(client.is_cancelled());
        assert!(interrupt.next_cycle().is_cancelled());
    }

    #[test]
    fn cancelling_a_cycle_leaves_the_root_alone() {
        let interrupt = Interrupt::new();
        let cycle = interrupt.next_cycle();
        cycle.token().cancel();
        assert!(!interrupt.is_interrupted());
        assert!(!interrupt.next_cycle().is_cancelled());
    }
}
