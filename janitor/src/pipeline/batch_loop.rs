use tokio_util::sync::CancellationToken;

use crate::email::EmailItem;

use super::{
    coordinator::ClassificationCoordinator,
    types::{ClassificationResult, ItemOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Classifying,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Exhausted,
}

/// Walks a batch front to back, one item per step. The bound is fixed to the batch length
/// at construction and the index only moves forward.
pub struct BatchLoop<'a> {
    items: &'a [EmailItem],
    states: Vec<ItemState>,
    outcomes: Vec<ItemOutcome>,
    index: usize,
    bound: usize,
    state: LoopState,
}

impl<'a> BatchLoop<'a> {
    pub fn new(items: &'a [EmailItem]) -> Self {
        let bound = items.len();
        Self {
            items,
            states: vec![ItemState::Pending; bound],
            outcomes: Vec::with_capacity(bound),
            index: 0,
            bound,
            state: if bound == 0 {
                LoopState::Exhausted
            } else {
                LoopState::Running
            },
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn item_state(&self, index: usize) -> Option<ItemState> {
        self.states.get(index).copied()
    }

    /// Mark the item at the cursor as being classified and hand it out
    pub fn next_pending(&mut self) -> Option<(usize, &'a EmailItem)> {
        if self.state == LoopState::Exhausted || self.index >= self.bound {
            return None;
        }
        match self.states[self.index] {
            ItemState::Pending => {
                self.states[self.index] = ItemState::Classifying;
                Some((self.index, &self.items[self.index]))
            }
            ItemState::Classifying => Some((self.index, &self.items[self.index])),
            ItemState::Done => None,
        }
    }

    /// Record the outcome for the item at the cursor and advance
    pub fn complete(&mut self, outcome: ItemOutcome) {
        if self.state == LoopState::Exhausted {
            return;
        }
        self.states[self.index] = ItemState::Done;
        self.outcomes.push(outcome);
        self.index += 1;
        if self.index >= self.bound {
            self.state = LoopState::Exhausted;
        }
    }

    pub fn into_outcomes(self) -> Vec<ItemOutcome> {
        self.outcomes
    }

    /// Classify every item, stopping early at an item boundary when `cancel` fires.
    /// Returns one outcome per processed item, in batch order.
    pub async fn run(
        mut self,
        coordinator: &ClassificationCoordinator,
        cancel: &CancellationToken,
    ) -> Vec<ItemOutcome> {
        for _ in 0..self.bound {
            if cancel.is_cancelled() {
                tracing::warn!(
                    "Cancelled with {} of {} items classified",
                    self.index,
                    self.bound
                );
                break;
            }
            let Some((index, item)) = self.next_pending() else {
                break;
            };

            let outcome = match coordinator.classify(item).await {
                Ok(result) => {
                    log_classified(index, self.bound, item, &result);
                    ItemOutcome::Classified(result)
                }
                Err(e) => {
                    tracing::warn!(
                        email_id = %item.id,
                        error_kind = e.kind(),
                        "[{}/{}] classification failed: {}",
                        index + 1,
                        self.bound,
                        e
                    );
                    ItemOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            self.complete(outcome);
        }

        self.into_outcomes()
    }
}

fn log_classified(index: usize, total: usize, item: &EmailItem, result: &ClassificationResult) {
    tracing::info!(
        email_id = %item.id,
        category = %result.category,
        confidence = result.confidence,
        source = %result.source,
        refinements = result.refinement_count,
        "[{}/{}] {}",
        index + 1,
        total,
        item.subject
    );
}
