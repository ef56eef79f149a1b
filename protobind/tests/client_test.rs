use order_service_impl::{fixtures_dir, order_handlers, orders_proto};
use protobind::client::{CallTable, ClientSetup, CreateClientError, create_client};
use protobind::options::{LoaderOptions, Representation};
use protobind::schema::{ProtoFileLoader, SchemaReference, SchemaResolutionError};
use protobind::server::{HandlerTable, ServerSetup, ServiceRegistry, ServiceSetup, create_server};
use protobind::tonic::{Code, service::Routes};
use serde_json::{Value, json};


fn routes(handlers: HandlerTable) -> Routes {
    ServiceRegistry::build(
        vec![ServiceSetup::new(
            "orders.proto",
            "orders",
            "OrderService",
            handlers,
        )],
        &fixtures_dir(),
        LoaderOptions::default(),
        &ProtoFileLoader::new(),
    )
    .unwrap()
    .into_routes(false)
    .unwrap()
}

fn setup_calls(options: LoaderOptions, handlers: HandlerTable) -> CallTable<Routes> {
    let resolved = SchemaReference::new(orders_proto(), "orders", "OrderService")
        .resolve(&ProtoFileLoader::new(), options)
        .unwrap();

    let calls = ["GetOrder".to_string(), "CancelOrder".to_string()];

    CallTable::from_service(routes(handlers), &resolved, &calls).unwrap()
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_call_table_exposes_requested_names() {
    let calls = setup_calls(LoaderOptions::default(), order_handlers());

    assert_eq!(calls.service(), "orders.OrderService");
    assert_eq!(calls.len(), 2);

    let mut names: Vec<&str> = calls.names().collect();
    names.sort();
    assert_eq!(names, vec!["CancelOrder", "GetOrder"]);

    assert!(calls.contains("GetOrder"));
    assert!(!calls.contains("WatchOrders"));
    assert!(calls.get("GhostMethod").is_none());
}

#[test]
fn test_call_table_rejects_invalid_names() {
    let resolved = SchemaReference::new(orders_proto(), "orders", "OrderService")
        .resolve(&ProtoFileLoader::new(), LoaderOptions::default())
        .unwrap();

    let result = CallTable::from_service(
        routes(order_handlers()),
        &resolved,
        &["WatchOrders".to_string()],
    );
    assert!(matches!(
        result,
        Err(SchemaResolutionError::StreamingNotSupported { .. })
    ));

    let result = CallTable::from_service(
        routes(order_handlers()),
        &resolved,
        &["GhostMethod".to_string()],
    );
    assert!(matches!(
        result,
        Err(SchemaResolutionError::MethodNotFound { .. })
    ));
}

#[tokio::test]
async fn test_unary_call_with_default_options() {
    let calls = setup_calls(LoaderOptions::default(), order_handlers());

    let order = calls
        .get("GetOrder")
        .unwrap()
        .call(json!({ "id": 42 }))
        .await
        .unwrap();

    assert_eq!(order["id"], "42");
    assert_eq!(order["status"], "SHIPPED");
    assert_eq!(order["created_by"], "warehouse");
    assert_eq!(order["items"], json!([{ "sku": "A-1", "quantity": 2 }]));
    assert_eq!(order["card"], "visa");
    assert_eq!(order["payment"], "card");
}

#[tokio::test]
async fn test_unary_call_with_custom_options() {
    let options = LoaderOptions {
        keep_case: false,
        longs: Representation::Number,
        enums: Representation::Number,
        ..LoaderOptions::default()
    };
    let calls = setup_calls(options, order_handlers());

    let order = calls
        .get("GetOrder")
        .unwrap()
        .call(json!({ "id": "42" }))
        .await
        .unwrap();

    assert_eq!(order["id"], 42);
    assert_eq!(order["status"], 1);
    assert_eq!(order["createdBy"], "warehouse");
    assert!(order.get("created_by").is_none());
}

#[tokio::test]
async fn test_handler_errors_reach_the_caller() {
    let handlers = order_handlers().handler("GetOrder", |_request: Value| async move {
        Err::<Value, _>(std::io::Error::other("disk on fire"))
    });
    let calls = setup_calls(LoaderOptions::default(), handlers);

    let status = calls
        .get("CancelOrder")
        .unwrap()
        .call(json!({ "id": "1" }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);
    assert_eq!(status.message(), "denied");

    let status = calls
        .get("GetOrder")
        .unwrap()
        .call(json!({ "id": "1" }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Cancelled);
    assert_eq!(status.message(), "UnexpectedError");
}

#[tokio::test]
async fn test_method_without_handler_is_unimplemented() {
    let handlers = HandlerTable::new().handler("GetOrder", order_service_impl::get_order);
    let calls = setup_calls(LoaderOptions::default(), handlers);

    let status = calls
        .get("CancelOrder")
        .unwrap()
        .call(json!({ "id": "1" }))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Unimplemented);
}

#[tokio::test]
async fn test_client_and_server_over_tcp() {
    let setup = ServerSetup::new(fixtures_dir()).service(ServiceSetup::new(
        "orders.proto",
        "orders",
        "OrderService",
        order_handlers(),
    ));
    let server = create_server(setup, "127.0.0.1:0", None).await.unwrap();
    let port = server.local_addr().port();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve_with_shutdown(async move {
        shutdown_rx.await.ok();
    }));

    let setup = ClientSetup::new(
        orders_proto(),
        "orders",
        "OrderService",
        format!("127.0.0.1:{port}"),
    )
    .call("GetOrder");
    let calls = create_client(setup, None).await.unwrap();

    let order = calls
        .get("GetOrder")
        .unwrap()
        .call(json!({ "id": 7 }))
        .await
        .unwrap();
    assert_eq!(order["id"], "7");
    assert_eq!(order["status"], "SHIPPED");

    shutdown_tx.send(()).unwrap();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_create_client_error_cases() {
    let address = format!("127.0.0.1:{}", closed_port());

    // 1. Unknown call name fails before connecting
    let setup = ClientSetup::new(orders_proto(), "orders", "OrderService", address.clone())
        .call("GhostMethod");
    let err = create_client(setup, None).await.unwrap_err();
    assert!(matches!(
        err,
        CreateClientError::Schema(SchemaResolutionError::MethodNotFound { .. })
    ));

    // 2. Unknown service
    let setup = ClientSetup::new(orders_proto(), "orders", "GhostService", address.clone());
    let err = create_client(setup, None).await.unwrap_err();
    assert!(matches!(
        err,
        CreateClientError::Schema(SchemaResolutionError::ServiceNotFound { .. })
    ));

    // 3. Nobody listening
    let setup =
        ClientSetup::new(orders_proto(), "orders", "OrderService", address).call("GetOrder");
    let err = create_client(setup, None).await.unwrap_err();
    assert!(matches!(err, CreateClientError::ConnectionFailed(..)));
}
