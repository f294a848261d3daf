//! Correction gateway.
//!
//! Turns a finalized word into a [`CorrectionResult`] without stalling the
//! caller. The lookup itself is behind a [`Resolver`]: in a single process it
//! is a dictionary read, in the privileged daemon it is a round trip to the
//! client over the secure channel. Either way each word is resolved on its
//! own task.

use super::dictionary::{CorrectionLookup, DictionaryHandle};
use super::types::{CorrectionResult, WordBoundary};
use crate::stats::StatsSink;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("channel is not connected")]
    Disconnected,
    #[error("no answer within the resolve timeout")]
    TimedOut,
}

/// Something that can answer a word-check request.
pub trait Resolver: Send + Sync + 'static {
    fn resolve(
        &self,
        candidate: WordBoundary,
    ) -> impl Future<Output = Result<CorrectionResult, ResolveError>> + Send;
}

/// Resolves against an in-process dictionary.
#[derive(Debug, Clone)]
pub struct LocalResolver<L = DictionaryHandle> {
    lookup: L,
}

impl<L: CorrectionLookup> LocalResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }
}

impl<L: CorrectionLookup> Resolver for LocalResolver<L> {
    fn resolve(
        &self,
        candidate: WordBoundary,
    ) -> impl Future<Output = Result<CorrectionResult, ResolveError>> + Send {
        let result = match self.lookup.check_word(&candidate.word) {
            Some(correction) => candidate.resolved(correction),
            None => candidate.unchanged(),
        };
        std::future::ready(Ok(result))
    }
}

pub struct CorrectionGateway<R> {
    resolver: Arc<R>,
    stats: Option<Arc<dyn StatsSink>>,
}

impl<R> Clone for CorrectionGateway<R> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            stats: self.stats.clone(),
        }
    }
}

impl<R: Resolver> CorrectionGateway<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver: Arc::new(resolver),
            stats: None,
        }
    }

    /// Report every checked and corrected word to `stats`.
    pub fn with_stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Resolve one word.
    ///
    /// An empty `correction` in the result means the word was checked and
    /// needs no change.
    pub async fn resolve(&self, candidate: WordBoundary) -> Result<CorrectionResult, ResolveError> {
        tracing::debug!(word = %candidate.word, "checking word");
        let result = self.resolver.resolve(candidate).await?;

        if let Some(stats) = &self.stats {
            stats.notify_checked(&result.word);
            if result.is_correction() {
                stats.notify_corrected(&result.word, &result.correction);
            }
        }
        Ok(result)
    }

    /// Resolve `candidate` on its own task and hand the result to `deliver`.
    ///
    /// Failed resolutions are logged and never delivered.
    pub fn spawn<F>(&self, runtime: &Handle, candidate: WordBoundary, deliver: F) -> JoinHandle<()>
    where
        F: FnOnce(CorrectionResult) + Send + 'static,
    {
        let gateway = self.clone();
        runtime.spawn(async move {
            match gateway.resolve(candidate).await {
                Ok(result) => deliver(result),
                Err(e) => tracing::debug!("word left uncorrected: {e}"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::DictionarySnapshot;
    use crate::stats::UsageStats;

    fn gateway() -> CorrectionGateway<LocalResolver> {
        let dict = DictionarySnapshot::from_entries([("teh", "the")]);
        CorrectionGateway::new(LocalResolver::new(DictionaryHandle::fixed(dict)))
    }

    struct Unreachable;

    impl Resolver for Unreachable {
        fn resolve(
            &self,
            _candidate: WordBoundary,
        ) -> impl Future<Output = Result<CorrectionResult, ResolveError>> + Send {
            std::future::ready(Err(ResolveError::Disconnected))
        }
    }

    #[tokio::test]
    async fn test_resolve_found_and_not_found() {
        let gateway = gateway();

        let hit = gateway.resolve(WordBoundary::new("teh", ' ')).await.unwrap();
        assert_eq!(hit.correction, "the");
        assert_eq!(hit.delimiter, ' ');

        let miss = gateway.resolve(WordBoundary::new("the", '.')).await.unwrap();
        assert!(!miss.is_correction());
        assert_eq!(miss.word, "the");
    }

    #[tokio::test]
    async fn test_stats_are_notified() {
        let stats = Arc::new(UsageStats::new());
        let gateway = gateway().with_stats(stats.clone());

        gateway.resolve(WordBoundary::new("teh", ' ')).await.unwrap();
        gateway.resolve(WordBoundary::new("fine", ' ')).await.unwrap();

        let snap = stats.stats();
        assert_eq!(snap.words_checked, 2);
        assert_eq!(snap.words_corrected, 1);
    }

    #[tokio::test]
    async fn test_spawn_delivers_result() {
        let (tx, rx) = std::sync::mpsc::channel();
        gateway()
            .spawn(&Handle::current(), WordBoundary::new("teh", ','), move |result| {
                tx.send(result).unwrap();
            })
            .await
            .unwrap();

        let result = rx.try_recv().unwrap();
        assert_eq!(result, WordBoundary::new("teh", ',').resolved("the"));
    }

    #[tokio::test]
    async fn test_failed_resolution_is_not_delivered() {
        let stats = Arc::new(UsageStats::new());
        let gateway = CorrectionGateway::new(Unreachable).with_stats(stats.clone());
        let (tx, rx) = std::sync::mpsc::channel::<CorrectionResult>();

        gateway
            .spawn(&Handle::current(), WordBoundary::new("teh", ' '), move |result| {
                tx.send(result).unwrap();
            })
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(stats.stats().words_checked, 0);
    }
}
