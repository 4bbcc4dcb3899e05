//! A [`Service`] that answers from a fixture catalog.
//!
//! The active fixture is named by the [`TEST_SELECTOR_HEADER`]. Serve one
//! behind a [`wirerpc::HttpHandler`] to test a client stack against canned
//! outcomes.

use std::sync::Arc;

use wirerpc::CallContext;
use wirerpc::Codec;
use wirerpc::Dto;
use wirerpc::OperationDescriptor;
use wirerpc::Service;
use wirerpc::ServiceContract;
use wirerpc::ServiceError;
use wirerpc::ServiceResult;
use wirerpc::codec::JsonCodec;

use crate::catalog::Catalog;
use crate::catalog::Check;
use crate::catalog::Expectation;
use crate::tester::TEST_SELECTOR_HEADER;

pub struct FixtureService {
    contract: Arc<ServiceContract>,
    catalog: Arc<Catalog>,
    codec: Arc<dyn Codec>,
}

impl FixtureService {
    pub fn new(contract: &Arc<ServiceContract>, catalog: Arc<Catalog>) -> Self {
        Self { contract: Arc::clone(contract), catalog, codec: Arc::new(JsonCodec::standard()) }
    }

    /// The codec fixture trees are read with.
    pub fn with_tree_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }
}

impl std::fmt::Debug for FixtureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureService")
            .field("contract", &self.contract.name())
            .field("fixtures", &self.catalog.len())
            .finish()
    }
}

#[async_trait::async_trait]
impl Service for FixtureService {
    fn contract(&self) -> &Arc<ServiceContract> {
        &self.contract
    }

    async fn call(&self, operation: &OperationDescriptor, request: Dto, cx: &CallContext) -> ServiceResult<Dto> {
        if cx.cancel.is_cancelled() {
            return Err(ServiceError::canceled());
        }
        let name = cx
            .header(TEST_SELECTOR_HEADER)
            .ok_or_else(|| ServiceError::invalid_request(format!("missing header '{}'", TEST_SELECTOR_HEADER)))?;
        let case = self
            .catalog
            .get(name)
            .ok_or_else(|| ServiceError::invalid_request(format!("unknown test '{}'", name)))?;
        let Check::Operation { operation: target, request: literal, expected } = &case.check else {
            return Err(ServiceError::invalid_request(format!("test '{}' is not an operation test", name)));
        };
        if !target.eq_ignore_ascii_case(&operation.name) {
            return Err(ServiceError::invalid_request(format!(
                "test '{}' is for operation '{}', not '{}'",
                name, target, operation.name
            )));
        }

        let fixture = self
            .codec
            .from_tree(literal, &operation.request)
            .map_err(|e| ServiceError::internal_error(format!("test '{}' has an unreadable request: {}", name, e)))?;
        if !self.codec.equivalent(&fixture, &request) {
            tracing::debug!(test = name, "request differs from fixture");
            return Err(ServiceError::invalid_request(format!("unexpected request for test '{}'", name)));
        }

        match expected {
            Expectation::Response(tree) => self.codec.from_tree(tree, &operation.response).map_err(|e| {
                ServiceError::internal_error(format!("test '{}' has an unreadable response: {}", name, e))
            }),
            Expectation::Error(tree) => Err(ServiceError::from_tree(tree).unwrap_or_else(|| {
                ServiceError::internal_error(format!("test '{}' has an unreadable error", name))
            })),
        }
    }
}
