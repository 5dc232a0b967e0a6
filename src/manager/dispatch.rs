//! Running completion work off the transport's event-delivery path

use tokio::runtime::Handle;

#[derive(Debug, Clone)]
pub(crate) enum Dispatcher {
    /// Blocking pool of a tokio runtime
    Runtime(Handle),
    /// Detached OS threads, used when no runtime was available at build time
    Threads,
}

impl Dispatcher {
    pub fn current() -> Self {
        Handle::try_current()
            .map(Dispatcher::Runtime)
            .unwrap_or(Dispatcher::Threads)
    }

    pub fn dispatch<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Dispatcher::Runtime(handle) => {
                // The JoinHandle is dropped; the job still runs to completion.
                let _ = handle.spawn_blocking(job);
            }
            Dispatcher::Threads => {
                if let Err(e) = std::thread::Builder::new()
                    .name("tasklane-dispatch".to_string())
                    .spawn(job)
                {
                    tracing::error!("Failed to spawn dispatch thread: {}", e);
                }
            }
        }
    }
}
