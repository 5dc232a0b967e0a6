//! Background download example
//!
//! Downloads a file through a background session, reports progress, and
//! waits for the session to signal that all of its events were delivered.

use tasklane::{Action, Configuration, Request, SessionManager};
use tokio::sync::oneshot;

const IDENTIFIER: &str = "com.example.tasklane.background";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manager = SessionManager::new()?;

    let url = "https://httpbin.org/bytes/102400";
    let mut destination = std::env::current_dir()?;
    destination.push("background_download_test.bin");
    println!("Downloading {} to {:?}", url, destination);

    let (events_tx, events_rx) = oneshot::channel();
    manager.register_background_completion(IDENTIFIER, move || {
        let _ = events_tx.send(());
    });

    let request = Request::download(url, &destination)
        .progress(|downloaded, total| match total {
            Some(total) => {
                let percentage = (downloaded as f64 / total as f64) * 100.0;
                println!("Downloaded: {:.1}% ({} / {} bytes)", percentage, downloaded, total);
            }
            None => println!("Downloaded: {} bytes", downloaded),
        })
        .build()?;

    let (done_tx, done_rx) = oneshot::channel();
    let (error_tx, error_rx) = oneshot::channel();

    let handle = manager.submit(
        request,
        &Configuration::background(IDENTIFIER),
        vec![
            Action::on_success(move |response| {
                let _ = done_tx.send(response.resource_location().map(|p| p.to_path_buf()));
            }),
            Action::on_failure(move |error| {
                let _ = error_tx.send(error.to_string());
            }),
        ],
    );
    println!("Submitted request {} ({:?})", handle.id(), handle.state());

    tokio::select! {
        location = done_rx => {
            let location = location?;
            println!("Download completed: {:?}", location);
            if let Some(path) = location {
                println!("File size on disk: {} bytes", std::fs::metadata(path)?.len());
            }
        }
        error = error_rx => {
            println!("Download failed: {}", error?);
        }
    }

    if tokio::time::timeout(std::time::Duration::from_secs(5), events_rx).await.is_ok() {
        println!("Background session finished delivering events");
    }

    Ok(())
}
