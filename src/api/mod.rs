//! The car REST resource.
//!
//! | Method | Path            | Success |
//! |--------|-----------------|---------|
//! | GET    | `/api/cars`     | 200     |
//! | POST   | `/api/car`      | 201 + `Location` |
//! | GET    | `/api/car/last` | 200, 404 when empty |
//! | GET    | `/api/car/:id`  | 200     |
//! | PUT    | `/api/car/:id`  | 200     |
//! | DELETE | `/api/car/:id`  | 204     |
//!
//! Cacheable responses carry a weak `ETag`, a `Last-Modified` date and a
//! `Cache-Control` built from [`CachePolicy`].

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::context::Context;
use crate::http::date::format_http_date;
use crate::http::headers::names;
use crate::middleware::{ConditionalGetMiddleware, LoggerMiddleware, Pipeline};
use crate::server::{Server, ServerError};
use crate::store::{Car, CarRepository};
use crate::{Response, Router, StatusCode};

pub const CARS_PATH: &str = "/api/cars";
pub const CAR_PATH: &str = "/api/car";
pub const LAST_CAR_PATH: &str = "/api/car/last";

/// Path of a single car.
pub fn car_path(id: u64) -> String {
    format!("{CAR_PATH}/{id}")
}

/// Freshness the origin advertises on cacheable responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// `max-age` in seconds. `0` makes every reuse a revalidation.
    pub max_age: u64,
}

impl CachePolicy {
    fn cache_control(self) -> String {
        format!("max-age={}, must-revalidate", self.max_age)
    }
}

fn collection_etag(version: u64) -> String {
    format!("W/\"v{version}\"")
}

fn car_etag(car: &Car) -> String {
    format!("W/\"{}-{}\"", car.id, car.last_modified.timestamp_millis())
}

fn with_validators(
    res: Response,
    etag: String,
    modified: Option<DateTime<Utc>>,
    policy: CachePolicy,
) -> Response {
    let res = res
        .header(names::ETAG, etag)
        .header(names::CACHE_CONTROL, policy.cache_control());
    match modified {
        Some(at) => res.header(names::LAST_MODIFIED, format_http_date(at)),
        None => res,
    }
}

fn car_id(ctx: &Context) -> Option<u64> {
    ctx.params().parse("id")
}

fn bad_id() -> Response {
    Response::new(StatusCode::BadRequest).body("car id must be a positive integer")
}

/// Builds the router for the car resource over `repo`.
pub fn router(repo: Arc<CarRepository>, policy: CachePolicy) -> Router {
    let mut router = Router::new();

    let r = Arc::clone(&repo);
    router.get(CARS_PATH, move |_ctx| {
        let repo = Arc::clone(&r);
        async move {
            let (cars, version) = repo.snapshot();
            let modified = cars.iter().map(|c| c.last_modified).max();
            let res = Response::json(StatusCode::Ok, &cars);
            with_validators(res, collection_etag(version), modified, policy)
        }
    });

    let r = Arc::clone(&repo);
    router.post(CAR_PATH, move |_ctx| {
        let repo = Arc::clone(&r);
        async move {
            let car = repo.create();
            tracing::debug!(id = car.id, "car created");
            Response::json(StatusCode::Created, &car).header(names::LOCATION, car_path(car.id))
        }
    });

    // Registered before `/api/car/:id` so `last` is not read as an id.
    let r = Arc::clone(&repo);
    router.get(LAST_CAR_PATH, move |_ctx| {
        let repo = Arc::clone(&r);
        async move {
            let res = match repo.last_id().and_then(|id| repo.get(id)) {
                Some(car) => Response::json(StatusCode::Ok, &car),
                None => Response::new(StatusCode::NotFound),
            };
            res.header(names::CACHE_CONTROL, "no-store")
        }
    });

    let r = Arc::clone(&repo);
    router.get("/api/car/:id", move |ctx| {
        let repo = Arc::clone(&r);
        async move {
            let Some(id) = car_id(&ctx) else {
                return bad_id();
            };
            match repo.get(id) {
                Some(car) => {
                    let res = Response::json(StatusCode::Ok, &car);
                    with_validators(res, car_etag(&car), Some(car.last_modified), policy)
                }
                None => Response::new(StatusCode::NotFound),
            }
        }
    });

    let r = Arc::clone(&repo);
    router.put("/api/car/:id", move |ctx| {
        let repo = Arc::clone(&r);
        async move {
            let Some(id) = car_id(&ctx) else {
                return bad_id();
            };
            match repo.touch(id) {
                Some(car) => {
                    tracing::debug!(id, "car touched");
                    Response::json(StatusCode::Ok, &car)
                }
                None => Response::new(StatusCode::NotFound),
            }
        }
    });

    let r = Arc::clone(&repo);
    router.delete("/api/car/:id", move |ctx| {
        let repo = Arc::clone(&r);
        async move {
            let Some(id) = car_id(&ctx) else {
                return bad_id();
            };
            if repo.delete(id) {
                tracing::debug!(id, "car deleted");
                Response::new(StatusCode::NoContent)
            } else {
                Response::new(StatusCode::NotFound)
            }
        }
    });

    router
}

/// The full origin stack: logging, conditional GET, then the car routes.
pub fn pipeline(repo: Arc<CarRepository>, policy: CachePolicy) -> Pipeline {
    Pipeline::new(router(repo, policy))
        .with(LoggerMiddleware)
        .with(ConditionalGetMiddleware)
}

/// A car resource served on a background task.
pub struct Origin {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl Origin {
    /// Binds `addr` and starts serving the car resource over `repo`.
    pub async fn start(
        addr: &str,
        repo: Arc<CarRepository>,
        policy: CachePolicy,
    ) -> Result<Self, ServerError> {
        let server = Server::bind(addr).await?;
        let addr = server.local_addr();
        let pipeline = Arc::new(pipeline(repo, policy));
        let (shutdown, signal) = oneshot::channel();

        let task = tokio::spawn(server.run_until(
            move |request| {
                let pipeline = Arc::clone(&pipeline);
                async move { pipeline.handle(request).await }
            },
            async {
                let _ = signal.await;
            },
        ));

        Ok(Self {
            addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting connections and waits for the accept loop to finish.
    pub async fn stop(self) -> Result<(), ServerError> {
        let _ = self.shutdown.send(());
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ServerError::Io(std::io::Error::other(e))),
        }
    }
}
