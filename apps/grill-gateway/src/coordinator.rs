//! Fan-out of resource operations across the registered backend services.
//!
//! Services are called one at a time in snapshot order. The first failure ends
//! the operation: it is `FAILED` when nothing succeeded before it and
//! `PARTIAL` otherwise. Services after the failing one are never attempted and
//! services that already succeeded are not rolled back.

use std::time::Duration;

use grill_sdk::{
    OperationResult, RegistrySnapshot, ResourceDescriptor, ResourceOp, ResourceService,
    ServiceError, ServiceFailure, SessionHandle,
};
use tracing::{debug, error, info};

use crate::metrics;

#[derive(Debug, Clone)]
pub struct ResourceCoordinator {
    call_timeout: Duration,
}

impl ResourceCoordinator {
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }

    /// Applies `op` to every service in `snapshot`. Backend failures are
    /// folded into the returned result, never raised.
    pub async fn apply(
        &self,
        op: ResourceOp,
        session: &SessionHandle,
        resource: &ResourceDescriptor,
        snapshot: &RegistrySnapshot,
    ) -> OperationResult {
        let mut succeeded = Vec::with_capacity(snapshot.len());

        for service in snapshot.iter() {
            let outcome =
                match tokio::time::timeout(self.call_timeout, service.apply(op, session, resource))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ServiceError::Timeout(self.call_timeout)),
                };

            match outcome {
                Ok(()) => {
                    debug!(service = service.name(), %op, %session, "resource operation applied");
                    succeeded.push(service.name().to_string());
                }
                Err(err) => {
                    error!(
                        service = service.name(),
                        %op,
                        %session,
                        kind = %resource.kind,
                        location = %resource.location,
                        error = %err,
                        "resource operation failed on service"
                    );
                    metrics::BACKEND_FAILURES
                        .with_label_values(&[service.name(), op.as_str()])
                        .inc();
                    let failure = ServiceFailure {
                        service_name: service.name().to_string(),
                        error_detail: err.to_string(),
                        unknown_session: matches!(err, ServiceError::UnknownSession),
                    };
                    let result = if succeeded.is_empty() {
                        OperationResult::failed(format!("{} resource has failed", op.verb()))
                    } else {
                        OperationResult::partial(format!(
                            "{} resource is partial, failed for service:{}",
                            op.verb(),
                            service.name()
                        ))
                    };
                    return finish(op, result.with_services(succeeded).with_failure(failure));
                }
            }
        }

        info!(%op, %session, services = succeeded.len(), "resource operation succeeded everywhere");
        finish(
            op,
            OperationResult::succeeded(format!("{} resource succeeded", op.verb()))
                .with_services(succeeded),
        )
    }
}

fn finish(op: ResourceOp, result: OperationResult) -> OperationResult {
    metrics::RESOURCE_OPS
        .with_label_values(&[op.as_str(), result.status.as_str()])
        .inc();
    result
}
