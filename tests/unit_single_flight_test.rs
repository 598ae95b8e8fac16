// tests/unit_single_flight_test.rs

use bytes::Bytes;
use pixelgate::core::Response;
use pixelgate::core::flight::{Flight, SingleFlight};
use std::time::Duration;

fn response(body: &'static str) -> Response {
    Response::buffered(200, Bytes::from_static(body.as_bytes()))
}

#[tokio::test]
async fn test_first_acquire_is_owner_rest_are_waiters() {
    let flight = SingleFlight::new();

    let first = flight.acquire("k");
    assert!(matches!(first, Flight::Owner(_)));

    let second = flight.acquire("k");
    assert!(matches!(second, Flight::Waiter(_)));

    // A different key gets its own owner.
    assert!(matches!(flight.acquire("other"), Flight::Owner(_)));
}

#[tokio::test]
async fn test_publish_broadcasts_to_all_waiters_and_clears_key() {
    let flight = SingleFlight::new();
    let Flight::Owner(owner) = flight.acquire("k") else {
        panic!("first acquire must own the key");
    };

    let mut tickets = Vec::new();
    for _ in 0..5 {
        match flight.acquire("k") {
            Flight::Waiter(ticket) => tickets.push(ticket),
            Flight::Owner(_) => panic!("second acquire must wait"),
        }
    }

    owner.publish(&response("result"));

    for mut ticket in tickets {
        let got = ticket.recv().await.expect("waiter should receive");
        assert_eq!(
            got.into_body_bytes().await.unwrap(),
            Bytes::from_static(b"result")
        );
    }

    // The key is free again.
    assert!(flight.is_empty());
    assert!(matches!(flight.acquire("k"), Flight::Owner(_)));
}

#[tokio::test]
async fn test_release_without_publish_closes_waiter_channels() {
    let flight = SingleFlight::new();
    let Flight::Owner(owner) = flight.acquire("k") else {
        panic!("first acquire must own the key");
    };
    let Flight::Waiter(mut ticket) = flight.acquire("k") else {
        panic!("second acquire must wait");
    };

    drop(owner);

    // A closed channel tells the waiter to recompute independently.
    assert!(ticket.recv().await.is_none());
    assert!(flight.is_empty());
}

#[tokio::test]
async fn test_cancelled_waiter_is_withdrawn_from_broadcast() {
    let flight = SingleFlight::new();
    let Flight::Owner(owner) = flight.acquire("k") else {
        panic!("first acquire must own the key");
    };
    let Flight::Waiter(cancelled) = flight.acquire("k") else {
        panic!("second acquire must wait");
    };
    let Flight::Waiter(mut kept) = flight.acquire("k") else {
        panic!("third acquire must wait");
    };

    cancelled.cancel();
    owner.publish(&response("late"));

    let got = kept.recv().await.expect("remaining waiter should receive");
    assert_eq!(got.status, 200);
}

#[tokio::test]
async fn test_purge_stale_keeps_live_entries() {
    let flight = SingleFlight::new();
    let _owner = match flight.acquire("live") {
        Flight::Owner(owner) => owner,
        Flight::Waiter(_) => panic!("first acquire must own the key"),
    };

    // A fresh entry is never purged, even with no waiters.
    assert_eq!(flight.purge_stale(Duration::from_secs(60)), 0);
    assert_eq!(flight.len(), 1);

    // With a zero max-age the entry is old enough, and all (zero) waiter
    // channels count as closed.
    assert_eq!(flight.purge_stale(Duration::ZERO), 1);
    assert!(flight.is_empty());
}
