// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use assetgrid_api::Client;
use assetgrid_app::{ApiError, AssetApi, AssetId, AssetStatus, NewAsset, StatusState};
use serde_json::{Value, json};
use std::io::Read;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Response, Server};

fn json_header() -> Header {
    Header::from_bytes("Content-Type", "application/json").expect("valid content type header")
}

fn mock_server() -> Result<(Server, String)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());
    Ok((server, addr))
}

/// Serves one request and hands back its method, url and JSON body.
fn serve_once(
    server: Server,
    status: u16,
    reply: &'static str,
) -> thread::JoinHandle<(Method, String, Value)> {
    thread::spawn(move || {
        let mut request = server.recv().expect("request expected");
        let mut body = String::new();
        request
            .as_reader()
            .read_to_string(&mut body)
            .expect("request body readable");
        let seen = (
            request.method().clone(),
            request.url().to_owned(),
            serde_json::from_str(&body).unwrap_or(Value::Null),
        );
        let response = Response::from_string(reply)
            .with_status_code(status)
            .with_header(json_header());
        request.respond(response).expect("response should succeed");
        seen
    })
}

#[test]
fn unreachable_server_is_transport_error() -> Result<()> {
    let client = Client::new("http://127.0.0.1:1", Duration::from_millis(50))?;
    let error = client
        .list_items()
        .expect_err("list should fail for unreachable endpoint");
    assert!(matches!(error, ApiError::Transport(_)));
    assert!(error.to_string().contains("api.base_url"));
    Ok(())
}

#[test]
fn list_items_decodes_records() -> Result<()> {
    let (server, addr) = mock_server()?;
    let handle = serve_once(
        server,
        200,
        r#"[{"id":"AST-1","serial":"CAT-1","category":"Excavator","brand":"Caterpillar","type":"Tracked","vehicle":"VH-1","statusState":"maintenance","statusLevel":2,"endDate":"2025-01-15"}]"#,
    );

    let client = Client::new(&addr, Duration::from_secs(1))?;
    let items = client.list_items()?;
    let (method, url, _) = handle.join().map_err(|_| anyhow!("server thread panicked"))?;

    assert_eq!(method, Method::Get);
    assert_eq!(url, "/api/items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, AssetId::from("AST-1"));
    assert_eq!(
        items[0].status,
        AssetStatus::new(StatusState::Maintenance, Some(2))
    );
    Ok(())
}

#[test]
fn patch_sends_partial_body() -> Result<()> {
    let (server, addr) = mock_server()?;
    let handle = serve_once(server, 200, "{}");

    let client = Client::new(&addr, Duration::from_secs(1))?;
    client.patch_item(
        &AssetId::from("AST-7"),
        &json!({ "statusState": "repair", "statusLevel": null }),
    )?;
    let (method, url, body) = handle.join().map_err(|_| anyhow!("server thread panicked"))?;

    assert_eq!(method, Method::Patch);
    assert_eq!(url, "/api/items/AST-7");
    assert_eq!(body, json!({ "statusState": "repair", "statusLevel": null }));
    Ok(())
}

#[test]
fn patch_failure_surfaces_status_and_body() -> Result<()> {
    let (server, addr) = mock_server()?;
    let handle = serve_once(server, 500, "database is locked");

    let client = Client::new(&addr, Duration::from_secs(1))?;
    let error = client
        .patch_item(&AssetId::from("AST-7"), &json!({ "serial": "X" }))
        .expect_err("500 must fail");
    handle.join().map_err(|_| anyhow!("server thread panicked"))?;

    assert_eq!(
        error,
        ApiError::Status {
            status: 500,
            body: "database is locked".to_owned(),
        }
    );
    assert_eq!(error.detail(), "database is locked");
    Ok(())
}

#[test]
fn batch_delete_posts_id_list() -> Result<()> {
    let (server, addr) = mock_server()?;
    let handle = serve_once(server, 200, r#"{"count":2}"#);

    let client = Client::new(&addr, Duration::from_secs(1))?;
    client.delete_items(&[AssetId::from("AST-1"), AssetId::from("AST-3")])?;
    let (method, url, body) = handle.join().map_err(|_| anyhow!("server thread panicked"))?;

    assert_eq!(method, Method::Delete);
    assert_eq!(url, "/api/items/batch");
    assert_eq!(body, json!({ "ids": ["AST-1", "AST-3"] }));
    Ok(())
}

#[test]
fn create_returns_server_record() -> Result<()> {
    let (server, addr) = mock_server()?;
    let handle = serve_once(
        server,
        201,
        r#"{"id":"AST-9","serial":"SN-9","category":"Truck","brand":"Volvo","type":"Tipper","vehicle":"VH-9","statusState":"operational","statusLevel":5,"endDate":null}"#,
    );

    let client = Client::new(&addr, Duration::from_secs(1))?;
    let created = client.create_item(&NewAsset {
        id: AssetId::from("AST-9"),
        serial: "SN-9".to_owned(),
        category: "Truck".to_owned(),
        brand: "Volvo".to_owned(),
        asset_type: "Tipper".to_owned(),
        vehicle: "VH-9".to_owned(),
        status: AssetStatus::new(StatusState::Operational, Some(5)),
    })?;
    let (method, url, body) = handle.join().map_err(|_| anyhow!("server thread panicked"))?;

    assert_eq!(method, Method::Post);
    assert_eq!(url, "/api/items");
    assert_eq!(body["type"], json!("Tipper"));
    assert_eq!(created.id, AssetId::from("AST-9"));
    assert_eq!(created.end_date, None);
    Ok(())
}
