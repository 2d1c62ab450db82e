//! The execution layer boundary.
//!
//! A [`Dispatcher`] receives a fully parsed [`Request`] and fills in the [`Response`]:
//! status, headers and body. Returning an error makes the connection answer with a
//! `500` stock response instead.

use async_trait::async_trait;

use crate::protocol::{DispatchError, Request, Response};

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn execute(&self, request: &Request, response: &mut Response) -> Result<(), DispatchError>;
}

/// Adapts a synchronous closure into a [`Dispatcher`].
#[derive(Debug)]
pub struct DispatcherFn<F> {
    f: F,
}

#[async_trait]
impl<F> Dispatcher for DispatcherFn<F>
where
    F: Fn(&Request, &mut Response) -> Result<(), DispatchError> + Send + Sync,
{
    async fn execute(&self, request: &Request, response: &mut Response) -> Result<(), DispatchError> {
        (self.f)(request, response)
    }
}

pub fn dispatcher_fn<F>(f: F) -> DispatcherFn<F>
where
    F: Fn(&Request, &mut Response) -> Result<(), DispatchError> + Send + Sync,
{
    DispatcherFn { f }
}
