use std::sync::Arc;

use bytes::BytesMut;
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn};

use crate::buffer::BufferPool;
use crate::codec::{CONTINUE_RESPONSE, ResponseEncoder};
use crate::config::ServerConfig;
use crate::connection::protocol_handler::{Event, ProtocolHandler};
use crate::handler::Dispatcher;
use crate::protocol::{HttpError, Outbound, Request, Response, StockResponse};

/// One HTTP exchange over a split stream.
///
/// `HttpConnection` reads bytes into pool blocks, drives the [`ProtocolHandler`] until
/// a request is complete, hands request and response to a [`Dispatcher`] and writes
/// the response back. Body blocks the dispatcher fills are written while it keeps
/// running, so a response can be larger than the pool. Every exchange ends with the
/// connection closing:
/// - parse errors answer with a stock response for the parser's status
/// - allocation failures and dispatch errors answer with a `500` stock response,
///   unless the response head already went out
/// - a peer that closes early ends the connection quietly
///
/// # Type Parameters
///
/// * `R`: The async readable stream type
/// * `W`: The async writable stream type
#[derive(Debug)]
pub struct HttpConnection<R, W> {
    reader: R,
    writer: W,
    pool: BufferPool,
    handler: ProtocolHandler,
    encoder: ResponseEncoder,
}

impl<R, W> HttpConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, pool: BufferPool, config: &ServerConfig) -> Self {
        Self { reader, writer, pool, handler: ProtocolHandler::new(config), encoder: ResponseEncoder::new() }
    }

    /// Serves one request.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and on allocation failures. Those still get a best
    /// effort `500` response before the error is returned.
    pub async fn process<D>(mut self, dispatcher: Arc<D>) -> Result<(), HttpError>
    where
        D: Dispatcher + ?Sized,
    {
        let Some(request) = self.read_request().await? else {
            return Ok(());
        };

        let (sink, mut outbound) = mpsc::unbounded_channel();
        let mut response = Response::streaming(self.pool.clone(), sink);
        let result = {
            let dispatch = dispatcher.execute(&request, &mut response);
            tokio::pin!(dispatch);
            loop {
                tokio::select! {
                    biased;
                    result = &mut dispatch => break result,
                    Some(next) = outbound.recv() => self.write_outbound(next).await?,
                }
            }
        };

        if let Err(e) = result {
            error!(cause = %e, path = request.path(), "dispatch failed");
            if response.is_committed() {
                warn!("response already committed, closing the connection");
                drop(response);
                while let Some(next) = outbound.recv().await {
                    self.write_outbound(next).await?;
                }
                return self.writer.shutdown().await.map_err(HttpError::io);
            }
            drop(response);
            return self.send_stock(StatusCode::INTERNAL_SERVER_ERROR).await;
        }
        drop(request);

        self.send_response(response, outbound).await
    }

    async fn read_request(&mut self) -> Result<Option<Box<Request>>, HttpError> {
        loop {
            if self.handler.prepare_read() {
                match self.pool.acquire_async().await {
                    Ok(handle) => self.handler.attach_buffer(handle),
                    Err(e) => {
                        error!(cause = %e, "can't acquire read buffer");
                        self.handler.discard();
                        self.send_stock(StatusCode::INTERNAL_SERVER_ERROR).await?;
                        return Err(e.into());
                    }
                }
            }

            let count = self.reader.read(self.handler.read_space()).await.map_err(HttpError::io)?;
            if count == 0 {
                info!(received = self.handler.received(), "peer closed the connection");
                self.handler.discard();
                return Ok(None);
            }

            match self.handler.handle_read(count) {
                Event::NeedRead => {}
                Event::SendContinue => {
                    self.writer.write_all(CONTINUE_RESPONSE).await.map_err(HttpError::io)?;
                    self.writer.flush().await.map_err(HttpError::io)?;
                    info!("receive expect request header, sent continue response");
                }
                Event::Complete(request) => return Ok(Some(request)),
                Event::Reject(status) => {
                    warn!(%status, "reject request");
                    self.send_stock(status).await?;
                    return Ok(None);
                }
            }
        }
    }

    async fn send_response(
        &mut self,
        mut response: Response,
        mut outbound: UnboundedReceiver<Outbound>,
    ) -> Result<(), HttpError> {
        if response.is_committed() {
            // the sealed tail follows the blocks already queued
            std::io::Write::flush(&mut response)?;
            drop(response);
            while let Some(next) = outbound.recv().await {
                self.write_outbound(next).await?;
            }
        } else {
            let mut head = BytesMut::new();
            self.encoder.encode_head(&response, &mut head)?;
            self.writer.write_all(&head).await.map_err(HttpError::io)?;

            for block in response.into_body().into_chain().iter() {
                self.writer.write_all(block.filled()).await.map_err(HttpError::io)?;
            }
        }
        self.writer.flush().await.map_err(HttpError::io)?;
        self.writer.shutdown().await.map_err(HttpError::io)
    }

    async fn write_outbound(&mut self, next: Outbound) -> Result<(), HttpError> {
        match next {
            Outbound::Head(head) => {
                debug!("response committed, streaming the body");
                self.writer.write_all(&head).await.map_err(HttpError::io)
            }
            // the block goes back to the pool once written
            Outbound::Block(block) => self.writer.write_all(block.filled()).await.map_err(HttpError::io),
        }
    }

    async fn send_stock(&mut self, status: StatusCode) -> Result<(), HttpError> {
        let mut dst = BytesMut::new();
        self.encoder.encode_stock(StockResponse::new(status), &mut dst)?;
        self.writer.write_all(&dst).await.map_err(HttpError::io)?;
        self.writer.flush().await.map_err(HttpError::io)?;
        self.writer.shutdown().await.map_err(HttpError::io)
    }
}
