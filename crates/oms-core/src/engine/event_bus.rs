//! In-process broadcast bus for order service events.

use oms_types::OmsEvent;
use tokio::sync::broadcast;

/// Broadcast channel shared by the engine, the payment coordinator and the
/// background tasks. Cloning yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<OmsEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<OmsEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Fails only when nobody is subscribed.
	pub fn publish(&self, event: OmsEvent) -> Result<(), broadcast::error::SendError<OmsEvent>> {
		self.sender.send(event).map(|_| ())
	}
}
