//! Lifecycle management for the order engine.

use super::{EngineError, OrderEngine};

impl OrderEngine {
	/// Resolves orders left in Processing by a previous run.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		tracing::info!(service_id = %self.config.service.id, "Initializing order engine");

		let report = self
			.recovery
			.recover_state()
			.await
			.map_err(|e| EngineError::Service(format!("Recovery failed: {}", e)))?;
		tracing::info!(
			checked = report.checked,
			resolved = report.resolved,
			still_processing = report.still_processing,
			failed = report.failed,
			"Recovery finished"
		);
		Ok(())
	}

	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down order engine");
		Ok(())
	}
}
