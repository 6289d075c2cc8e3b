//! Wire-level checks of the car resource through the plain HTTP client.

use std::sync::Arc;
use std::time::Duration;

use cachelens::api::{CARS_PATH, CAR_PATH, CachePolicy, LAST_CAR_PATH, Origin, car_path};
use cachelens::client::{HttpClient, Transport};
use cachelens::http::headers::names;
use cachelens::store::{Car, CarRepository};
use cachelens::{Method, Request, StatusCode};

async fn start() -> (Origin, Arc<CarRepository>, HttpClient) {
    let repo = Arc::new(CarRepository::default());
    let origin = Origin::start("127.0.0.1:0", Arc::clone(&repo), CachePolicy { max_age: 5 })
        .await
        .unwrap();
    let client = HttpClient::new(origin.local_addr().to_string(), Duration::from_secs(5)).unwrap();
    (origin, repo, client)
}

#[tokio::test]
async fn post_then_fetch_by_location() {
    let (origin, _repo, client) = start().await;

    let created = client.send(Request::new(Method::Post, CAR_PATH)).await.unwrap();
    assert_eq!(created.status(), StatusCode::Created);
    let location = created.headers().get(names::LOCATION).unwrap().to_owned();
    let posted: Car = created.decode().unwrap();

    let fetched = client.send(Request::get(&location)).await.unwrap();
    assert_eq!(fetched.status(), StatusCode::Ok);
    assert_eq!(fetched.decode::<Car>().unwrap(), posted);
    assert_eq!(
        fetched.headers().get(names::CACHE_CONTROL),
        Some("max-age=5, must-revalidate")
    );

    origin.stop().await.unwrap();
}

#[tokio::test]
async fn matching_etag_yields_not_modified() {
    let (origin, repo, client) = start().await;
    repo.create();

    let first = client.send(Request::get(CARS_PATH)).await.unwrap();
    let etag = first.headers().get(names::ETAG).unwrap().to_owned();
    assert!(!first.headers().contains(names::SERVER_CACHE));

    let second = client
        .send(Request::get(CARS_PATH).header(names::IF_NONE_MATCH, etag.clone()))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::NotModified);
    assert!(second.body_ref().is_empty());
    assert_eq!(second.headers().get(names::ETAG), Some(etag.as_str()));
    assert_eq!(second.headers().get(names::SERVER_CACHE), Some("not-modified"));

    repo.create();
    let third = client
        .send(Request::get(CARS_PATH).header(names::IF_NONE_MATCH, etag))
        .await
        .unwrap();
    assert_eq!(third.status(), StatusCode::Ok);
    assert_eq!(third.headers().get(names::SERVER_CACHE), Some("modified"));
    assert_eq!(third.decode::<Vec<Car>>().unwrap().len(), 2);

    origin.stop().await.unwrap();
}

#[tokio::test]
async fn last_endpoint_is_never_cacheable() {
    let (origin, repo, client) = start().await;

    let missing = client.send(Request::get(LAST_CAR_PATH)).await.unwrap();
    assert_eq!(missing.status(), StatusCode::NotFound);

    let car = repo.create();
    let found = client.send(Request::get(LAST_CAR_PATH)).await.unwrap();
    assert_eq!(found.status(), StatusCode::Ok);
    assert_eq!(found.headers().get(names::CACHE_CONTROL), Some("no-store"));
    assert_eq!(found.decode::<Car>().unwrap().id, car.id);

    origin.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_and_malformed_targets() {
    let (origin, _repo, client) = start().await;

    let res = client.send(Request::get(car_path(42))).await.unwrap();
    assert_eq!(res.status(), StatusCode::NotFound);

    let res = client.send(Request::get("/api/car/-1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BadRequest);

    let res = client.send(Request::get("/api/trucks")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NotFound);

    origin.stop().await.unwrap();
}
