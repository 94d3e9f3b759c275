//! Admission service implementation.

use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, instrument, warn};

use super::proto::floodgate::admission::v1::{
    admission_service_server::AdmissionService, AllowRequest, AllowResponse, Policy,
};

use crate::error::FloodgateError;
use crate::ratelimit::AdmissionBackend;

/// Implementation of the AdmissionService gRPC interface.
pub struct AdmissionServiceImpl<B: AdmissionBackend> {
    /// The admission backend
    backend: Arc<B>,
}

impl<B: AdmissionBackend> AdmissionServiceImpl<B> {
    /// Create a new AdmissionServiceImpl over the given backend.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[tonic::async_trait]
impl<B: AdmissionBackend + 'static> AdmissionService for AdmissionServiceImpl<B> {
    /// Decide whether one unit of work may proceed.
    #[instrument(
        skip(self, request),
        fields(
            resource = %request.get_ref().resource,
            key = %request.get_ref().key
        )
    )]
    async fn allow(
        &self,
        request: Request<AllowRequest>,
    ) -> Result<Response<AllowResponse>, Status> {
        let req = request.into_inner();

        if req.resource.is_empty() {
            warn!("Received admission request with empty resource");
            return Err(Status::invalid_argument("resource is required"));
        }

        let decision = self
            .backend
            .admit(&req.resource, &req.key)
            .await
            .map_err(|e| match e {
                FloodgateError::UnknownResource(resource) => {
                    warn!(resource = %resource, "Admission requested for unknown resource");
                    Status::not_found(format!("unknown resource: {}", resource))
                }
                other => Status::internal(other.to_string()),
            })?;

        debug!(
            allowed = decision.allowed,
            policy = %decision.policy,
            "Admission decision made"
        );

        Ok(Response::new(AllowResponse {
            allowed: decision.allowed,
            policy: Policy::from(decision.policy).into(),
        }))
    }
}
