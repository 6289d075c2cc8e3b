use std::future::Future;
use std::sync::Arc;

use crate::api::LAST_CAR_PATH;
use crate::client::Transport;
use crate::store::{Car, CarRepository};
use crate::{Method, Request, StatusCode};

use super::ConsoleError;

/// Finds the identifier of the repository's "last" car.
///
/// Which car that is belongs to the repository; resolvers only ask.
pub trait LastIdResolver {
    fn last_id(&self) -> impl Future<Output = Result<Option<u64>, ConsoleError>>;
}

/// Asks the origin through `GET /api/car/last`.
///
/// Give it its own uncached transport: the lookup is out-of-band and must
/// neither show up in the loop's traffic nor be answered from a cache.
pub struct EndpointResolver<T> {
    transport: T,
}

impl<T: Transport> EndpointResolver<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: Transport> LastIdResolver for EndpointResolver<T> {
    async fn last_id(&self) -> Result<Option<u64>, ConsoleError> {
        let response = self.transport.send(Request::get(LAST_CAR_PATH)).await?;
        match response.status() {
            StatusCode::Ok => Ok(Some(response.decode::<Car>()?.id)),
            StatusCode::NotFound => Ok(None),
            status => Err(ConsoleError::UnsuccessfulStatus {
                method: Method::Get,
                target: LAST_CAR_PATH.to_owned(),
                status,
            }),
        }
    }
}

/// Reads the repository directly; only possible when it lives in this process.
pub struct RepositoryResolver {
    repo: Arc<CarRepository>,
}

impl RepositoryResolver {
    pub fn new(repo: Arc<CarRepository>) -> Self {
        Self { repo }
    }
}

impl LastIdResolver for RepositoryResolver {
    async fn last_id(&self) -> Result<Option<u64>, ConsoleError> {
        Ok(self.repo.last_id())
    }
}
