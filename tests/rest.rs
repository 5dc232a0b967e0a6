mod common;

use common::{MockTransport, expect_one, recorder};
use http::Method;
use serde::{Deserialize, Serialize};
use tasklane::{Auth, Configuration, Error, Operation, RestClient};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Todo {
    id: u32,
    title: String,
    completed: bool,
}

fn todo() -> Todo {
    Todo {
        id: 1,
        title: "Write tests".to_string(),
        completed: false,
    }
}

fn client(transport: &MockTransport) -> RestClient {
    RestClient::builder("https://api.example.test/v1")
        .header("X-Trace", "default")
        .auth(Auth::bearer("secret"))
        .manager(transport.manager())
        .build()
        .unwrap()
}

#[test]
fn test_get_decodes_typed_payload() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let (done, rx) = recorder::<tasklane::Result<Todo>>();

    client
        .resource("todos/1")
        .header("X-Trace", "call")
        .get(done)
        .unwrap();

    let task = transport.session(0).task(0);
    let request = task.request();
    assert_eq!(request.method(), &Method::GET);
    assert_eq!(request.url().as_str(), "https://api.example.test/v1/todos/1");
    let traces: Vec<_> = request
        .headers()
        .get_all("x-trace")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(traces, vec!["default", "call"]);
    assert_eq!(
        request.headers().get("authorization").unwrap(),
        "Bearer secret"
    );

    task.respond(200, &[("Content-Type", "application/json")]);
    task.send_data(&serde_json::to_vec(&todo()).unwrap());
    task.complete(None);

    assert_eq!(expect_one(&rx).unwrap(), todo());
}

#[test]
fn test_each_operation_uses_its_own_method() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let payload = todo();

    client.post("todos", &payload, |_| {}).unwrap();
    client.put("todos/1", &payload, |_| {}).unwrap();
    client.patch("todos/1", &payload, |_| {}).unwrap();
    client.delete("todos/1", |_| {}).unwrap();

    let methods: Vec<Method> = transport
        .session(0)
        .tasks()
        .iter()
        .map(|task| task.request().method().clone())
        .collect();
    assert_eq!(
        methods,
        vec![Method::POST, Method::PUT, Method::PATCH, Method::DELETE]
    );

    let patch = transport.session(0).task(2);
    let body: Todo = serde_json::from_slice(patch.request().body().unwrap()).unwrap();
    assert_eq!(body, payload);
    assert_eq!(
        patch.request().headers().get("content-type").unwrap(),
        "application/json"
    );
    assert!(transport.session(0).task(3).request().body().is_none());
}

#[test]
fn test_mutation_success() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let (done, rx) = recorder::<tasklane::Result<()>>();

    client
        .resource("todos/1")
        .send(Operation::Update, Some(&serde_json::json!({"completed": true})), done)
        .unwrap();

    let task = transport.session(0).task(0);
    assert_eq!(task.request().method(), &Method::PATCH);
    task.respond(204, &[]);
    task.complete(None);

    assert!(expect_one(&rx).is_ok());
}

#[test]
fn test_transport_error_takes_precedence() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let (done, rx) = recorder::<tasklane::Result<Todo>>();

    client.get("todos/1", done).unwrap();
    let task = transport.session(0).task(0);
    task.respond(500, &[]);
    task.send_data(b"not json");
    task.complete(Some(Error::Network {
        code: -1005,
        message: "connection lost".to_string(),
    }));

    assert!(matches!(expect_one(&rx), Err(Error::Network { code: -1005, .. })));
}

#[test]
fn test_status_error_before_decode_error() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let (done, rx) = recorder::<tasklane::Result<Todo>>();

    client.get("todos/404", done).unwrap();
    let task = transport.session(0).task(0);
    task.respond(404, &[]);
    task.send_data(b"<html>missing</html>");
    task.complete(None);

    let error = expect_one(&rx).unwrap_err();
    assert_eq!(error.status_code(), Some(404));
    assert_eq!(error.to_string(), "HTTP 404: Not Found (client error)");
}

#[test]
fn test_decode_error_reported_last() {
    let transport = MockTransport::new();
    let client = client(&transport);
    let (done, rx) = recorder::<tasklane::Result<Todo>>();

    client.get("todos/1", done).unwrap();
    let task = transport.session(0).task(0);
    task.respond(200, &[]);
    task.send_data(b"{\"id\": \"one\"}");
    task.complete(None);

    assert!(matches!(expect_one(&rx), Err(Error::Json(_))));
}

#[test]
fn test_query_parameters_are_encoded() {
    let transport = MockTransport::new();
    let client = client(&transport);

    client
        .resource("/search")
        .query("q", "a b&c")
        .query("page", "2")
        .get::<serde_json::Value, _>(|_| {})
        .unwrap();

    let url = transport.session(0).task(0).request().url().clone();
    assert_eq!(url.path(), "/v1/search");
    assert_eq!(url.query(), Some("q=a%20b%26c&page=2"));
}

#[test]
fn test_construction_errors_are_synchronous() {
    let transport = MockTransport::new();
    let client = client(&transport);

    let result = client
        .resource("todos")
        .header("bad header", "value")
        .get::<Todo, _>(|_| {});
    assert!(matches!(result, Err(Error::InvalidHeader)));
    assert_eq!(transport.session_count(), 0);
}

#[test]
fn test_download_and_upload() {
    let transport = MockTransport::new();
    let client = RestClient::builder("https://files.example.test")
        .configuration(Configuration::background("com.example.files"))
        .manager(transport.manager())
        .build()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();

    let source = dir.path().join("report.csv");
    std::fs::write(&source, b"a,b\n1,2\n").unwrap();
    let (uploaded, upload_rx) = recorder::<tasklane::Result<()>>();
    client
        .resource("reports/7")
        .upload(Operation::Replace, &source, uploaded)
        .unwrap();

    let upload = transport.session(0).task(0);
    assert_eq!(upload.request().method(), &Method::PUT);
    assert_eq!(upload.request().source_location(), Some(source.as_path()));
    upload.sent(8, Some(8));
    upload.respond(201, &[]);
    upload.complete(None);
    assert!(expect_one(&upload_rx).is_ok());

    let destination = dir.path().join("copy.csv");
    let (downloaded, download_rx) = recorder::<tasklane::Result<std::path::PathBuf>>();
    client
        .resource("reports/7")
        .download(&destination, downloaded)
        .unwrap();

    let download = transport.session(0).task(1);
    assert_eq!(download.request().method(), &Method::GET);
    download.respond(200, &[]);
    let temporary = dir.path().join("transport.tmp");
    std::fs::write(&temporary, b"a,b\n1,2\n").unwrap();
    download.finish_download(&temporary);
    download.complete(None);

    assert_eq!(expect_one(&download_rx).unwrap(), destination);
    assert_eq!(std::fs::read(&destination).unwrap(), b"a,b\n1,2\n");
    assert_eq!(transport.session_count(), 1);
}

#[test]
fn test_download_status_error_keeps_destination() {
    let transport = MockTransport::new();
    let client = RestClient::builder("https://files.example.test")
        .manager(transport.manager())
        .build()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("copy.csv");
    std::fs::write(&destination, b"previous").unwrap();

    let (downloaded, rx) = recorder::<tasklane::Result<std::path::PathBuf>>();
    client
        .resource("reports/404")
        .download(&destination, downloaded)
        .unwrap();

    let download = transport.session(0).task(0);
    assert_ne!(download.request().destination_location(), Some(destination.as_path()));
    download.respond(404, &[]);
    let temporary = dir.path().join("transport.tmp");
    std::fs::write(&temporary, b"{\"error\":\"not found\"}").unwrap();
    download.finish_download(&temporary);
    download.complete(None);

    match expect_one(&rx) {
        Err(Error::Status { code, .. }) => assert_eq!(code, 404),
        other => panic!("expected status error, got {:?}", other),
    }
    assert_eq!(std::fs::read(&destination).unwrap(), b"previous");
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("copy.csv")]);
}

#[test]
fn test_basic_auth_default_header() {
    let transport = MockTransport::new();
    let client = RestClient::builder("https://api.example.test/")
        .auth(Auth::basic("user", "pass"))
        .manager(transport.manager())
        .build()
        .unwrap();

    assert_eq!(client.base_url().as_str(), "https://api.example.test/");
    assert_eq!(
        client.default_headers().get("authorization").unwrap(),
        "Basic dXNlcjpwYXNz"
    );
}
