//! Copy-on-write registry of the active transform chain.

use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::transform::Transform;

/// An ordered list of stages.
pub type TransformChain = Vec<Arc<dyn Transform>>;

/// An immutable view of the chain taken at the start of a run.
pub type ChainSnapshot = Arc<TransformChain>;

/// Holds the current chain and swaps it atomically on replacement.
///
/// A snapshot is never modified after it is handed out; `replace` installs a
/// new chain and runs holding the old snapshot finish with it.
pub struct TransformRegistry {
    chain: ArcSwap<TransformChain>,
}

impl TransformRegistry {
    pub fn new(chain: TransformChain) -> Self {
        Self {
            chain: ArcSwap::from_pointee(chain),
        }
    }

    /// Take a snapshot of the current chain.
    pub fn snapshot(&self) -> ChainSnapshot {
        self.chain.load_full()
    }

    /// Install a new chain. In-flight runs keep their snapshot.
    pub fn replace(&self, chain: TransformChain) {
        debug!(transforms = chain.len(), "Replacing transform chain");
        self.chain.store(Arc::new(chain));
    }

    pub fn len(&self) -> usize {
        self.chain.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.load().is_empty()
    }

    /// Stage names of the current chain, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.chain.load().iter().map(|t| t.name()).collect()
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}
