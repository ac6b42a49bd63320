//! Origin notifier: delivers the batch-complete signal over two channels.
//!
//! The primary channel is a message to the origin tab. It fails when that tab
//! has been closed or navigated away; the failure is logged and the platform
//! notification is raised regardless, so the user always hears about it.

use std::time::Duration;

use futures::future;
use serde::{Deserialize, Serialize};
use tabrun_protocol::{CompletionMessage, ContextId, NotificationConfig};

use crate::aggregate::BatchTally;
use crate::platform::ContextPlatform;
use crate::watcher::with_deadline;

/// How long the origin tab gets to acknowledge the completion message.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Which channels accepted the completion signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyReport {
	/// The origin tab received the message.
	pub delivered: bool,
	/// The platform notification was raised.
	pub fallback_shown: bool,
}

pub struct OriginNotifier<'a, P: ContextPlatform + ?Sized> {
	platform: &'a P,
	config: &'a NotificationConfig,
}

impl<'a, P: ContextPlatform + ?Sized> OriginNotifier<'a, P> {
	pub fn new(platform: &'a P, config: &'a NotificationConfig) -> Self {
		Self { platform, config }
	}

	/// Builds the completion message for `tally` and delivers it.
	pub async fn notify_batch(&self, tally: &BatchTally) -> NotifyReport {
		let message = CompletionMessage::batch_complete(&self.config.batch_message, tally.succeeded, tally.failed);
		self.notify(tally.origin, &message).await
	}

	/// Sends `message` to `origin` and raises the platform notification.
	///
	/// The two channels run concurrently, so a primary send that never settles
	/// cannot hold back the notification. Neither channel's failure is
	/// escalated.
	pub async fn notify(&self, origin: ContextId, message: &CompletionMessage) -> NotifyReport {
		let fallback_text = self.config.fallback_message.as_deref().unwrap_or(&message.human_message);
		let send = with_deadline(self.platform, Some(DELIVERY_TIMEOUT), self.platform.send_message(origin, message));
		let show = self.platform.show_notification(&self.config.title, fallback_text);

		let (sent, shown) = future::join(send, show).await;

		let delivered = match sent {
			Some(Ok(())) => true,
			Some(Err(err)) => {
				tracing::info!(%origin, error = %err, "origin tab not listening, relying on notification");
				false
			}
			None => {
				tracing::info!(%origin, after_ms = DELIVERY_TIMEOUT.as_millis() as u64, "origin tab never answered");
				false
			}
		};
		let fallback_shown = match shown {
			Ok(()) => true,
			Err(err) => {
				tracing::warn!(error = %err, "platform notification failed");
				false
			}
		};

		tracing::info!(%origin, delivered, fallback_shown, message = %message.human_message, "batch completion signalled");
		NotifyReport {
			delivered,
			fallback_shown,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sim::{Scenario, ScriptedPlatform, ScriptedTarget};

	fn tally() -> BatchTally {
		BatchTally {
			origin: ContextId::new(1),
			total: 2,
			completed_count: 2,
			succeeded: 1,
			failed: 1,
		}
	}

	fn platform(configure: impl FnOnce(&mut Scenario)) -> ScriptedPlatform {
		let mut scenario = Scenario::new(vec![ScriptedTarget::loads_after("https://shop.test/a", 10)]);
		configure(&mut scenario);
		ScriptedPlatform::new(scenario)
	}

	#[tokio::test]
	async fn both_channels_fire() {
		let platform = platform(|_| {});
		let config = NotificationConfig::default();

		let report = OriginNotifier::new(&platform, &config).notify_batch(&tally()).await;

		assert_eq!(
			report,
			NotifyReport {
				delivered: true,
				fallback_shown: true
			}
		);
		let messages = platform.messages();
		assert_eq!(messages.len(), 1);
		assert_eq!(messages[0].1.human_message, config.batch_message);
		assert_eq!((messages[0].1.completed, messages[0].1.failed), (1, 1));
		assert_eq!(platform.notifications().len(), 1);
	}

	#[tokio::test]
	async fn closed_origin_is_not_escalated() {
		let platform = platform(|s| s.origin_gone = true);
		let config = NotificationConfig::default();

		let report = OriginNotifier::new(&platform, &config).notify_batch(&tally()).await;

		assert!(!report.delivered);
		assert!(report.fallback_shown);
	}

	#[tokio::test]
	async fn fallback_message_overrides_notification_body() {
		let platform = platform(|_| {});
		let config = NotificationConfig {
			fallback_message: Some("Cart updated".to_string()),
			..NotificationConfig::default()
		};

		OriginNotifier::new(&platform, &config).notify_batch(&tally()).await;

		assert_eq!(platform.messages()[0].1.human_message, config.batch_message);
		assert_eq!(platform.notifications()[0].1, "Cart updated");
	}

	#[tokio::test(start_paused = true)]
	async fn unanswered_origin_does_not_hold_back_the_notification() {
		let platform = platform(|s| s.origin_unresponsive = true);
		let config = NotificationConfig::default();

		let report = OriginNotifier::new(&platform, &config).notify_batch(&tally()).await;

		assert!(!report.delivered);
		assert!(report.fallback_shown);
		assert_eq!(platform.notifications().len(), 1);
		assert_eq!(platform.notifications()[0].0, 0);
	}

	#[tokio::test]
	async fn unavailable_notifications_still_report_delivery() {
		let platform = platform(|s| s.notifications_unavailable = true);
		let config = NotificationConfig::default();

		let report = OriginNotifier::new(&platform, &config).notify_batch(&tally()).await;

		assert!(report.delivered);
		assert!(!report.fallback_shown);
		assert!(platform.notifications().is_empty());
	}
}
