//! Simple fetch example
//!
//! Submits a GET data request through the session manager and prints the
//! buffered response.

use tasklane::{Configuration, Request, SessionManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Creating session manager...");
    let manager = SessionManager::new()?;

    let request = Request::get("https://httpbin.org/json")
        .header("Accept", "application/json")
        .build()?;
    println!("Fetching {} (request {})", request.url(), request.id());

    let response = manager.fetch(request, &Configuration::Foreground).await?;

    println!("Response status: {}", response.status());
    println!("Content type: {:?}", response.mime_type());
    match response.pretty_printed() {
        Some(text) => println!("Body:\n{}", text),
        None => println!("Body: {} bytes", response.bytes().len()),
    }

    // Same request under an ephemeral configuration gets its own session
    let request = Request::get("https://httpbin.org/cookies").build()?;
    let response = manager.fetch(request, &Configuration::Ephemeral).await?;
    println!("Ephemeral status: {}", response.status());
    println!("Live sessions: {}", manager.session_count());

    Ok(())
}
