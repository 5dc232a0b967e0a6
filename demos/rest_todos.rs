//! REST client example
//!
//! Reads and mutates resources on a public JSON placeholder API.

use serde::{Deserialize, Serialize};
use tasklane::{Auth, RestClient};
use tokio::sync::oneshot;

#[derive(Debug, Serialize, Deserialize)]
struct Todo {
    #[serde(rename = "userId")]
    user_id: u32,
    id: Option<u32>,
    title: String,
    completed: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = RestClient::builder("https://jsonplaceholder.typicode.com")
        .header("Accept", "application/json")
        .auth(Auth::bearer("demo-token"))
        .build()?;

    println!("=== Fetch ===");
    let (tx, rx) = oneshot::channel();
    client.get("todos/1", move |result: tasklane::Result<Todo>| {
        let _ = tx.send(result);
    })?;
    let todo = rx.await??;
    println!("{:?}", todo);

    println!("\n=== Query ===");
    let (tx, rx) = oneshot::channel();
    client
        .resource("todos")
        .query("userId", "1")
        .query("completed", "true")
        .get(move |result: tasklane::Result<Vec<Todo>>| {
            let _ = tx.send(result);
        })?;
    println!("{} completed todos", rx.await??.len());

    println!("\n=== Create / Update / Delete ===");
    let draft = Todo {
        user_id: 1,
        id: None,
        title: "Try tasklane".to_string(),
        completed: false,
    };

    let (tx, rx) = oneshot::channel();
    client.post("todos", &draft, move |result| {
        let _ = tx.send(result);
    })?;
    println!("create: {:?}", rx.await?);

    let (tx, rx) = oneshot::channel();
    client.patch("todos/1", &serde_json::json!({"completed": true}), move |result| {
        let _ = tx.send(result);
    })?;
    println!("update: {:?}", rx.await?);

    let (tx, rx) = oneshot::channel();
    client.delete("todos/1", move |result| {
        let _ = tx.send(result);
    })?;
    println!("delete: {:?}", rx.await?);

    println!("\n=== Missing resource ===");
    let (tx, rx) = oneshot::channel();
    client.get("todos/0", move |result: tasklane::Result<Todo>| {
        let _ = tx.send(result);
    })?;
    match rx.await? {
        Ok(todo) => println!("unexpected: {:?}", todo),
        Err(e) => println!("error: {} (status {:?})", e, e.status_code()),
    }

    Ok(())
}
