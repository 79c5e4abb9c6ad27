//! Event driven scheduling of lookup passes.
//!
//! Hosts push [LookupEvent]s into the service's channel. Each drain collapses everything queued
//! into at most one pass: document paths are de-duplicated and force requests are merged. The
//! documents a pass writes are queued back as [LookupEvent::DocumentModified], so the cascade
//! between writes and recomputation runs through the queue and never re-enters a pass.
//!
//! A pass always visits every lookup instance the [RelatedIndex] knows about. Which documents
//! were modified only decides whether a pass runs at all; it does not narrow the pass.
//! Removals also drop the cached state of every instance hosted by the removed document.
use std::collections::BTreeSet;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{
    config::Settings,
    error::FieldnoteError,
    event::LookupEvent,
    lookup::engine::{run_pass, LookupIndex, PassReport, PassRequest},
    registry::FieldRegistry,
    source::{DocumentStore, RelatedIndex},
};

/// Everything one drain of the queue asked for.
#[derive(Debug, Default)]
struct Batch {
    /// Only triggers a pass, see the module docs
    modified: BTreeSet<String>,
    removed: BTreeSet<String>,
    index_updated: bool,
    full_reindex: bool,
    request: PassRequest,
}

impl Batch {
    fn is_empty(&self) -> bool {
        self.modified.is_empty()
            && self.removed.is_empty()
            && !self.index_updated
            && !self.full_reindex
            && !self.request.force_update_all
            && self.request.force_update_one.is_empty()
    }

    fn add(&mut self, event: LookupEvent) {
        match event {
            LookupEvent::DocumentModified(path) => {
                self.modified.insert(path);
            }
            LookupEvent::DocumentRemoved(path) => {
                self.modified.remove(&path);
                self.removed.insert(path);
            }
            LookupEvent::IndexUpdated => self.index_updated = true,
            LookupEvent::ForceUpdateAll => self.request.force_update_all = true,
            LookupEvent::ForceUpdateOne { path, field_name } => {
                let target = (path, field_name);
                if !self.request.force_update_one.contains(&target) {
                    self.request.force_update_one.push(target);
                }
            }
            LookupEvent::FullReindex => self.full_reindex = true,
        }
    }
}

pub struct LookupService<S, I, R> {
    store: S,
    related: I,
    registry: R,
    settings: Settings,
    index: LookupIndex,
    tx: UnboundedSender<LookupEvent>,
    rx: UnboundedReceiver<LookupEvent>,
}

impl<S, I, R> LookupService<S, I, R>
where
    S: DocumentStore,
    I: RelatedIndex,
    R: FieldRegistry,
{
    pub fn new(store: S, related: I, registry: R, settings: Settings) -> Self {
        let (tx, rx) = unbounded_channel();
        LookupService {
            store,
            related,
            registry,
            settings,
            index: LookupIndex::new(),
            tx,
            rx,
        }
    }

    /// A handle hosts use to deliver events from elsewhere.
    pub fn sender(&self) -> UnboundedSender<LookupEvent> {
        self.tx.clone()
    }

    pub fn enqueue(&self, event: LookupEvent) -> Result<(), FieldnoteError> {
        tracing::debug!("[LookupService] enqueue {}", event);
        Ok(self.tx.send(event)?)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn related(&self) -> &I {
        &self.related
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &LookupIndex {
        &self.index
    }

    fn drain(&mut self) -> Batch {
        let mut batch = Batch::default();
        while let Ok(event) = self.rx.try_recv() {
            batch.add(event);
        }
        batch
    }

    /// Drain the queue and run one pass if anything was queued. `None` when the queue was empty.
    pub async fn process_pending(&mut self) -> Result<Option<PassReport>, FieldnoteError> {
        let batch = self.drain();
        if batch.is_empty() {
            return Ok(None);
        }
        if batch.full_reindex {
            self.index.reset();
        }
        for path in batch.removed.iter() {
            self.index.forget_document(path);
        }
        tracing::debug!(
            "[LookupService] pass for {} modified, {} removed documents",
            batch.modified.len(),
            batch.removed.len()
        );
        let report = run_pass(
            &self.store,
            &self.related,
            &self.registry,
            &self.settings,
            &mut self.index,
            &batch.request,
        )
        .await?;
        Ok(Some(report))
    }

    /// Process events until a drain finds nothing queued or `max_passes` passes have run.
    ///
    /// Documents written by a pass are queued back as modifications before the next drain.
    pub async fn run_until_idle(&mut self) -> Result<Vec<PassReport>, FieldnoteError> {
        let mut reports = Vec::new();
        while reports.len() < self.settings.max_passes {
            let Some(report) = self.process_pending().await? else {
                break;
            };
            for path in report.written.iter() {
                self.enqueue(LookupEvent::DocumentModified(path.clone()))?;
            }
            reports.push(report);
        }
        if reports.len() == self.settings.max_passes && !self.rx.is_empty() {
            tracing::warn!(
                "[LookupService] stopped after {} passes with events still queued",
                self.settings.max_passes
            );
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_coalesces_events() {
        let mut batch = Batch::default();
        assert!(batch.is_empty());
        batch.add(LookupEvent::DocumentModified("a.md".to_string()));
        batch.add(LookupEvent::DocumentModified("a.md".to_string()));
        batch.add(LookupEvent::DocumentModified("b.md".to_string()));
        batch.add(LookupEvent::DocumentRemoved("b.md".to_string()));
        for _ in 0..2 {
            batch.add(LookupEvent::ForceUpdateOne {
                path: "a.md".to_string(),
                field_name: "kids".to_string(),
            });
        }
        assert_eq!(batch.modified.len(), 1);
        assert!(batch.removed.contains("b.md"));
        assert_eq!(batch.request.force_update_one.len(), 1);
        assert!(!batch.request.force_update_all);
        assert!(!batch.is_empty());
    }
}
