/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tree-structured cancellation tokens.
//!
//! Every long-running piece of work started by a chain node (a consensus instance, a transaction
//! publish, a state-diff fetch, an await-receipt query) is handed a [`CancellationToken`]. Tokens are
//! derived from one another with [`child`](CancellationToken::child): cancelling a token cancels every
//! token derived from it, transitively. The root token of a chain lives as long as the
//! [chain node](crate::chain_node::ChainNode) itself.
//!
//! Cancellation is cooperative: holders observe it by polling
//! [`is_cancelled`](CancellationToken::is_cancelled).

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// A cloneable handle to a node in a cancellation tree.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    cancelled: AtomicBool,
    parent: Option<Arc<TokenInner>>,
}

impl CancellationToken {
    /// Create a new root token.
    pub fn new() -> CancellationToken {
        CancellationToken {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent: None,
            }),
        }
    }

    /// Derive a token that is cancelled whenever this one is. A child of an already-cancelled token
    /// starts out cancelled.
    ///
    /// A child keeps its ancestors alive, so dropping an intermediate token never detaches its
    /// descendants from the root.
    pub fn child(&self) -> CancellationToken {
        CancellationToken {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent: Some(self.inner.clone()),
            }),
        }
    }

    /// Cancel this token and every token derived from it. Cancelling twice is a no-op.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst)
    }

    /// Whether this token or any of its ancestors was cancelled.
    pub fn is_cancelled(&self) -> bool {
        let mut token = Some(&self.inner);
        while let Some(inner) = token {
            if inner.cancelled.load(Ordering::SeqCst) {
                return true;
            }
            token = inner.parent.as_ref();
        }
        false
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
