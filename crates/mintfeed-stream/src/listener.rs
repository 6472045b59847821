//! `LogListener` trait: abstraction over a program log subscription.
//!
//! The engine runs one listener per watched program. A stream that ends, or
//! yields an error, means ingestion for that program is lost.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use mintfeed_core::error::StreamError;
use mintfeed_core::types::LogNotification;

pub type LogStream = Pin<Box<dyn Stream<Item = Result<LogNotification, StreamError>> + Send>>;

#[async_trait]
pub trait LogListener: Send + Sync {
    /// Program address this listener covers.
    fn program(&self) -> &str;

    /// Open the subscription and start streaming notifications.
    async fn subscribe(&self) -> Result<LogStream, StreamError>;
}
