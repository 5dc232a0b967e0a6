//! Session-managed HTTP transfers
//!
//! A [`SessionManager`] multiplexes data, upload and download requests over
//! one transport session per [`Configuration`] (foreground, ephemeral,
//! background or custom), correlates the transport's asynchronous events
//! back to each request, and reports every outcome exactly once through the
//! request's [`Action`]s. [`RestClient`] layers typed resource operations on
//! top.
//!
//! ```rust,no_run
//! use tasklane::{Configuration, Request, SessionManager};
//!
//! # #[tokio::main]
//! # async fn main() -> tasklane::Result<()> {
//! let manager = SessionManager::new()?;
//! let request = Request::get("https://httpbin.org/json").build()?;
//! let response = manager.fetch(request, &Configuration::Foreground).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

pub use action::{Action, ActionKind, FailureHandler, SuccessHandler, completion_actions};
pub use body::Body;
pub use config::{
    CachePolicy, Configuration, CookiePolicy, CookieStorage, CustomConfiguration,
    CustomConfigurationBuilder,
};
pub use error::{Error, Result};
pub use handle::{PendingResponse, RequestHandle};
pub use manager::{SessionManager, SessionManagerBuilder, TaskState};
pub use progress::{Progress, ProgressCallback, ProgressState};
pub use relocate::{FileRelocator, FsRelocator};
pub use request::{Request, RequestBuilder, RequestId, RequestKind};
pub use response::{Response, ResponseAccumulator, ResponseMetadata};
pub use rest::{Auth, Operation, Resource, RestClient, RestClientBuilder};
pub use status::{StatusClass, describe_status};

mod action;
mod body;
mod config;
mod error;
mod handle;
mod manager;
mod progress;
mod relocate;
mod request;
mod response;
pub mod rest;
mod status;
pub mod transport;
