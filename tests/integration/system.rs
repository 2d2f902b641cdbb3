use rocket::http::Status;
use rocket::local::blocking::Client;

use crate::common::test_hub;

fn client() -> Client {
    let ctx = test_hub();
    Client::tracked(chat_hub::build_rocket(ctx.hub)).expect("valid rocket instance")
}

#[test]
fn health_reports_store_connectivity() {
    let client = client();
    let res = client.get("/health").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["app"], "Chat Backend");
    assert_eq!(body["redis"], "connected");
    assert!(body["version"].is_string());
}

#[test]
fn root_names_the_socket_path() {
    let client = client();
    let res = client.get("/").dispatch();
    assert_eq!(res.status(), Status::Ok);
    let body: serde_json::Value = res.into_json().unwrap();
    assert!(body["message"].as_str().unwrap().starts_with("Welcome to"));
    assert_eq!(body["socket"], "/ws");
}
