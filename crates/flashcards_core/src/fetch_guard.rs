//! crates/flashcards_core/src/fetch_guard.rs
//!
//! Latest-wins guard for list/detail fetches: starting a new fetch cancels the
//! one still in flight, so a stale response can never land after a newer one.

use std::future::Future;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct LatestOnly {
    current: Mutex<Option<CancellationToken>>,
}

impl LatestOnly {
    pub fn new() -> Self {
        Self::default()
    }

    fn swap(&self, next: Option<CancellationToken>) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = std::mem::replace(&mut *current, next) {
            previous.cancel();
        }
    }

    /// Runs `fut`, cancelling whatever fetch this guard was running before.
    /// Returns `None` if `fut` was itself superseded or cancelled; that is a
    /// no-op for the caller, not an error.
    pub async fn run<F, T>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let token = CancellationToken::new();
        self.swap(Some(token.clone()));
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            out = fut => Some(out),
        }
    }

    /// Cancels the in-flight fetch, if any.
    pub fn cancel(&self) {
        self.swap(None);
    }
}
