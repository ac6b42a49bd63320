//! In-page action executor.
//!
//! Runs inside a target context, locates the element to act on through an
//! ordered [`StrategyChain`] and performs the action at most once. When the
//! element is not rendered yet, [`ActionExecutor::run`] re-checks on every
//! structural mutation batch, bounded by a batch budget and an optional
//! deadline. The mutation stream is dropped as soon as the executor returns,
//! which disconnects the underlying observer.

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::pin::pin;

use futures::future::{self, Either};
use futures::{Stream, StreamExt};
use tabrun_protocol::ActionOutcome;

/// A document the executor can search and act in.
pub trait ActionDocument {
	type Element;

	/// Performs the site action (a click) on `element`.
	fn perform(&self, element: &Self::Element) -> Result<(), String>;
}

/// One pluggable lookup rule.
pub trait LookupStrategy<D: ActionDocument + ?Sized> {
	/// Label reported when this strategy finds the element.
	fn name(&self) -> &str;

	fn find(&self, doc: &D) -> Option<D::Element>;
}

/// An element located by the strategy at `strategy` in its chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found<E> {
	pub strategy: usize,
	pub element: E,
}

/// Ordered list of lookup strategies; the first hit wins.
pub struct StrategyChain<D: ActionDocument + ?Sized> {
	strategies: Vec<Box<dyn LookupStrategy<D>>>,
}

impl<D: ActionDocument + ?Sized> StrategyChain<D> {
	pub fn new() -> Self {
		Self { strategies: Vec::new() }
	}

	pub fn with(mut self, strategy: impl LookupStrategy<D> + 'static) -> Self {
		self.push(strategy);
		self
	}

	pub fn push(&mut self, strategy: impl LookupStrategy<D> + 'static) {
		self.strategies.push(Box::new(strategy));
	}

	pub fn len(&self) -> usize {
		self.strategies.len()
	}

	pub fn is_empty(&self) -> bool {
		self.strategies.is_empty()
	}

	pub fn name(&self, index: usize) -> Option<&str> {
		self.strategies.get(index).map(|s| s.name())
	}

	/// Tries every strategy in order and returns the first element found.
	pub fn find_action_target(&self, doc: &D) -> Option<Found<D::Element>> {
		self.strategies
			.iter()
			.enumerate()
			.find_map(|(strategy, s)| s.find(doc).map(|element| Found { strategy, element }))
	}
}

impl<D: ActionDocument + ?Sized> Default for StrategyChain<D> {
	fn default() -> Self {
		Self::new()
	}
}

impl<D: ActionDocument + ?Sized> fmt::Debug for StrategyChain<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.strategies.iter().map(|s| s.name())).finish()
	}
}

/// Result of a single lookup-and-act attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
	Performed { strategy: String },
	NotFound,
	/// A previous attempt already performed the action.
	AlreadyPerformed,
	/// The element was found but acting on it threw.
	Failed { strategy: String, message: String },
}

/// How an [`ActionExecutor::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorOutcome {
	Performed { strategy: String, attempts: usize },
	/// The mutation batch budget ran out.
	Exhausted { attempts: usize },
	DeadlineElapsed { attempts: usize },
	/// The mutation source ended before the budget did.
	ObserverClosed { attempts: usize },
	AlreadyPerformed,
}

impl ExecutorOutcome {
	pub fn attempts(&self) -> usize {
		match self {
			ExecutorOutcome::Performed { attempts, .. }
			| ExecutorOutcome::Exhausted { attempts }
			| ExecutorOutcome::DeadlineElapsed { attempts }
			| ExecutorOutcome::ObserverClosed { attempts } => *attempts,
			ExecutorOutcome::AlreadyPerformed => 0,
		}
	}

	/// Wire form reported back to the orchestrator.
	pub fn to_action_outcome(&self) -> ActionOutcome {
		match self {
			ExecutorOutcome::Performed { strategy, .. } => ActionOutcome::Performed {
				strategy: strategy.clone(),
			},
			ExecutorOutcome::AlreadyPerformed => ActionOutcome::Unknown,
			_ => ActionOutcome::NotFound,
		}
	}
}

/// Performs the site action at most once per instance.
pub struct ActionExecutor<D: ActionDocument + ?Sized> {
	chain: StrategyChain<D>,
	max_mutation_batches: usize,
	performed: Cell<bool>,
}

impl<D: ActionDocument + ?Sized> ActionExecutor<D> {
	pub fn new(chain: StrategyChain<D>, max_mutation_batches: usize) -> Self {
		Self {
			chain,
			max_mutation_batches,
			performed: Cell::new(false),
		}
	}

	pub fn has_performed(&self) -> bool {
		self.performed.get()
	}

	/// Looks the element up once and acts on it if found.
	pub fn try_act(&self, doc: &D) -> Attempt {
		if self.performed.get() {
			return Attempt::AlreadyPerformed;
		}

		let Some(found) = self.chain.find_action_target(doc) else {
			return Attempt::NotFound;
		};
		let strategy = self.chain.name(found.strategy).unwrap_or_default().to_string();

		match doc.perform(&found.element) {
			Ok(()) => {
				self.performed.set(true);
				tracing::debug!(%strategy, "action performed");
				Attempt::Performed { strategy }
			}
			Err(message) => {
				tracing::warn!(%strategy, %message, "action threw");
				Attempt::Failed { strategy, message }
			}
		}
	}

	/// Tries immediately, then once per item of `mutations` until the action
	/// fires, the batch budget runs out, or `deadline` resolves.
	pub async fn run<M, T>(&self, doc: &D, mutations: M, deadline: T) -> ExecutorOutcome
	where
		M: Stream,
		T: Future<Output = ()>,
	{
		let mut attempts = 1;
		match self.try_act(doc) {
			Attempt::Performed { strategy } => return ExecutorOutcome::Performed { strategy, attempts },
			Attempt::AlreadyPerformed => return ExecutorOutcome::AlreadyPerformed,
			Attempt::NotFound | Attempt::Failed { .. } => {}
		}

		let mut mutations = pin!(mutations.take(self.max_mutation_batches));
		let mut deadline = pin!(deadline);

		loop {
			let batch = match future::select(mutations.next(), deadline.as_mut()).await {
				Either::Left((batch, _)) => batch,
				Either::Right(_) => {
					tracing::debug!(attempts, "executor deadline elapsed");
					return ExecutorOutcome::DeadlineElapsed { attempts };
				}
			};

			if batch.is_none() {
				return if attempts > self.max_mutation_batches {
					ExecutorOutcome::Exhausted { attempts }
				} else {
					ExecutorOutcome::ObserverClosed { attempts }
				};
			}

			attempts += 1;
			match self.try_act(doc) {
				Attempt::Performed { strategy } => return ExecutorOutcome::Performed { strategy, attempts },
				Attempt::AlreadyPerformed => return ExecutorOutcome::AlreadyPerformed,
				Attempt::NotFound | Attempt::Failed { .. } => {}
			}
		}
	}
}
