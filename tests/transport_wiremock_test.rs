//! `ReqwestHttpSender` integration tests against a `wiremock` mock server.
//!
//! Unlike `transport::fake::FakeHttpSender` (used by the coordinator's own
//! unit tests), these exercise the real HTTP round trip: request headers,
//! status handling, and wire (de)serialization all go through actual
//! sockets.

use std::time::Duration;

use bosh_core::transport::{HttpSender, ReqwestHttpSender};
use bosh_core::Body;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn make_sender(base_url: &str) -> ReqwestHttpSender {
    ReqwestHttpSender::new(url::Url::parse(base_url).expect("valid url"), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn post_with_body_response_is_decoded_and_returned() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            br#"<body xmlns="http://jabber.org/protocol/httpbind" sid="sess-1" ack="1"/>"#.to_vec(),
            "text/xml",
        ))
        .mount(&server)
        .await;

    let sender = make_sender(&server.uri());
    let handle = sender.send(Body::builder().attr("rid", "1").build());
    let response = handle.wait().await.expect("response should decode");

    assert_eq!(response.status, 200);
    assert_eq!(response.body.sid(), Some("sess-1"));
    assert_eq!(response.body.attr("ack"), Some("1"));
}

#[tokio::test]
async fn every_post_carries_content_type_text_xml() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("Content-Type", "text/xml; charset=utf-8"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            br#"<body xmlns="http://jabber.org/protocol/httpbind" sid="sess-2"/>"#.to_vec(),
            "text/xml",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let sender = make_sender(&server.uri());
    let handle = sender.send(Body::builder().attr("rid", "1").payload("<presence/>").build());
    handle.wait().await.expect("send should succeed");

    server.verify().await;
}

#[tokio::test]
async fn empty_response_body_is_a_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .mount(&server)
        .await;

    let sender = make_sender(&server.uri());
    let handle = sender.send(Body::builder().attr("rid", "1").build());
    let result = handle.wait().await;

    assert!(result.is_err(), "empty body must not be treated as a valid response");
}

#[tokio::test]
async fn malformed_xml_response_is_a_protocol_violation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not xml at all"))
        .mount(&server)
        .await;

    let sender = make_sender(&server.uri());
    let handle = sender.send(Body::builder().attr("rid", "1").build());
    let result = handle.wait().await;

    assert!(result.is_err(), "malformed body must surface as an error, not panic");
}
