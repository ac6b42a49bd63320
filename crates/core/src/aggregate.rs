//! Batch aggregation: the exactly-once completion join.
//!
//! A [`BatchAggregator`] counts finished targets. The call to
//! [`record_completion`](BatchAggregator::record_completion) that brings the
//! count to `total` resolves the paired [`BatchCompletion`] future; that is the
//! single resolution point for the whole batch. Counting and comparing happen
//! in one synchronous call, so no other task can observe the counter between
//! the increment and the check.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use tabrun_protocol::ContextId;

use crate::error::{Error, Result};
use crate::record::{TaskRecord, TaskStatus};

/// Final counts handed to the origin notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTally {
	pub origin: ContextId,
	pub total: usize,
	pub completed_count: usize,
	pub succeeded: usize,
	pub failed: usize,
}

/// What a single [`BatchAggregator::record_completion`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
	/// Counted; the batch is still waiting on other targets.
	Counted { completed_count: usize },
	/// This call completed the batch and fired the completion signal.
	Fired(BatchTally),
	/// The aggregate already fired; the call was ignored.
	Inert,
}

#[derive(Debug, Default)]
struct AggregateState {
	completed_count: usize,
	succeeded: usize,
	failed: usize,
	signal: Option<oneshot::Sender<BatchTally>>,
}

/// Counts target completions for one batch.
#[derive(Debug)]
pub struct BatchAggregator {
	origin: ContextId,
	total: usize,
	state: RefCell<AggregateState>,
}

impl BatchAggregator {
	/// Creates an aggregate expecting `total` completions.
	///
	/// # Errors
	///
	/// Returns [`Error::EmptyBatch`] when `total` is zero.
	pub fn create(origin: ContextId, total: usize) -> Result<(Self, BatchCompletion)> {
		if total == 0 {
			return Err(Error::EmptyBatch);
		}

		let (tx, rx) = oneshot::channel();
		let aggregator = Self {
			origin,
			total,
			state: RefCell::new(AggregateState {
				signal: Some(tx),
				..Default::default()
			}),
		};
		Ok((aggregator, BatchCompletion { rx }))
	}

	/// Counts one finished target.
	///
	/// Fires the completion signal on the call where the count first reaches
	/// `total`; every later call is a no-op that returns [`Recorded::Inert`].
	pub fn record_completion(&self, record: &TaskRecord) -> Recorded {
		let mut state = self.state.borrow_mut();
		if state.completed_count >= self.total {
			tracing::warn!(origin = %self.origin, link = %record.link, "completion recorded on inert aggregate");
			return Recorded::Inert;
		}

		if !record.is_terminal() {
			tracing::warn!(link = %record.link, status = ?record.status, "non-terminal record counted as failed");
		}

		state.completed_count += 1;
		if record.status == TaskStatus::Completed {
			state.succeeded += 1;
		} else {
			state.failed += 1;
		}

		tracing::debug!(
			origin = %self.origin,
			link = %record.link,
			completed = state.completed_count,
			total = self.total,
			"target recorded"
		);

		if state.completed_count < self.total {
			return Recorded::Counted {
				completed_count: state.completed_count,
			};
		}

		let tally = BatchTally {
			origin: self.origin,
			total: self.total,
			completed_count: state.completed_count,
			succeeded: state.succeeded,
			failed: state.failed,
		};
		if let Some(signal) = state.signal.take() {
			// The completion future may have been dropped by a caller that stopped waiting.
			let _ = signal.send(tally);
		}
		tracing::info!(origin = %self.origin, total = self.total, failed = tally.failed, "batch complete");
		Recorded::Fired(tally)
	}

	pub fn origin(&self) -> ContextId {
		self.origin
	}

	pub fn total(&self) -> usize {
		self.total
	}

	pub fn completed_count(&self) -> usize {
		self.state.borrow().completed_count
	}

	/// True once the completion signal has fired.
	pub fn is_inert(&self) -> bool {
		self.completed_count() >= self.total
	}
}

/// Resolves once, with the final [`BatchTally`], when the aggregate fires.
#[derive(Debug)]
#[must_use = "the completion signal is lost if this future is dropped"]
pub struct BatchCompletion {
	rx: oneshot::Receiver<BatchTally>,
}

impl Future for BatchCompletion {
	type Output = Result<BatchTally>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.rx).poll(cx).map(|res| res.map_err(|_| Error::AggregateDropped))
	}
}

#[cfg(test)]
mod tests {
	use futures::FutureExt;

	use super::*;
	use crate::record::FailureReason;

	fn finished(index: usize, ok: bool) -> TaskRecord {
		let mut record = TaskRecord::new(index, format!("https://shop.example/p/{index}"));
		if ok {
			record.transition(TaskStatus::Loading).unwrap();
			record.transition(TaskStatus::Injecting).unwrap();
			record.transition(TaskStatus::Completed).unwrap();
		} else {
			record.fail(FailureReason::ContextClosed);
		}
		record
	}

	#[test]
	fn zero_targets_is_rejected() {
		let err = BatchAggregator::create(ContextId::new(1), 0).unwrap_err();
		assert!(matches!(err, Error::EmptyBatch));
	}

	#[test]
	fn fires_exactly_once_on_last_completion() {
		let (aggregate, mut completion) = BatchAggregator::create(ContextId::new(1), 3).unwrap();

		assert_eq!(aggregate.record_completion(&finished(0, true)), Recorded::Counted { completed_count: 1 });
		assert!((&mut completion).now_or_never().is_none());
		assert_eq!(aggregate.record_completion(&finished(1, false)), Recorded::Counted { completed_count: 2 });

		let fired = aggregate.record_completion(&finished(2, true));
		let Recorded::Fired(tally) = fired else {
			panic!("expected Fired, got {fired:?}");
		};
		assert_eq!(tally.completed_count, 3);
		assert_eq!(tally.succeeded, 2);
		assert_eq!(tally.failed, 1);
		assert!(aggregate.is_inert());

		let resolved = completion.now_or_never().unwrap().unwrap();
		assert_eq!(resolved, tally);
	}

	#[test]
	fn calls_after_firing_are_inert() {
		let (aggregate, _completion) = BatchAggregator::create(ContextId::new(1), 1).unwrap();
		assert!(matches!(aggregate.record_completion(&finished(0, true)), Recorded::Fired(_)));
		assert_eq!(aggregate.record_completion(&finished(0, true)), Recorded::Inert);
		assert_eq!(aggregate.completed_count(), 1);
	}

	#[test]
	fn final_tally_is_order_independent() {
		let outcomes = [true, false, true, true, false];
		let orders: [[usize; 5]; 4] = [[0, 1, 2, 3, 4], [4, 3, 2, 1, 0], [2, 0, 4, 1, 3], [1, 4, 0, 3, 2]];

		let tallies: Vec<_> = orders
			.iter()
			.map(|order| {
				let (aggregate, completion) = BatchAggregator::create(ContextId::new(9), outcomes.len()).unwrap();
				let mut fired = 0;
				for &i in order {
					if let Recorded::Fired(_) = aggregate.record_completion(&finished(i, outcomes[i])) {
						fired += 1;
					}
				}
				assert_eq!(fired, 1);
				completion.now_or_never().unwrap().unwrap()
			})
			.collect();

		assert!(tallies.windows(2).all(|w| w[0] == w[1]));
		assert_eq!(tallies[0].failed, 2);
	}

	#[test]
	fn dropped_aggregate_cancels_completion() {
		let (aggregate, completion) = BatchAggregator::create(ContextId::new(1), 2).unwrap();
		aggregate.record_completion(&finished(0, true));
		drop(aggregate);
		let err = completion.now_or_never().unwrap().unwrap_err();
		assert!(matches!(err, Error::AggregateDropped));
	}
}
