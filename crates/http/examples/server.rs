use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use micro_servlet::buffer::BufferPool;
use micro_servlet::config::ServerConfig;
use micro_servlet::connection::HttpConnection;
use micro_servlet::handler::Dispatcher;
use micro_servlet::protocol::{DispatchError, Request, Response};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServerConfig::default().maximal_content_length(64 * 1024 * 1024);
    config.validate()?;
    let pool = BufferPool::new(&config.pool);

    info!(port = 8080, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return Err(e.into());
        }
    };

    let dispatcher = Arc::new(UploadDispatcher);
    loop {
        let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let dispatcher = Arc::clone(&dispatcher);
        let pool = pool.clone();
        let config = config.clone();

        tokio::spawn(async move {
            let (reader, writer) = tcp_stream.into_split();
            let connection = HttpConnection::new(reader, writer, pool, &config);
            if let Err(e) = connection.process(dispatcher).await {
                error!(cause = %e, "connection process error");
            }
        });
    }
}

/// Lists the parameters and uploaded files of a request, or echoes the body back.
///
/// Try it with `curl -F name=value -F file=@Cargo.toml http://127.0.0.1:8080/upload`,
/// or `curl --data-binary @Cargo.lock http://127.0.0.1:8080/echo`.
struct UploadDispatcher;

#[async_trait]
impl Dispatcher for UploadDispatcher {
    async fn execute(&self, request: &Request, response: &mut Response) -> Result<(), DispatchError> {
        info!(method = %request.method(), path = request.path(), "receiving request");

        if request.path() == "/echo" {
            let content_type = request.content_type().map_or_else(|| "application/octet-stream".to_owned(), ToString::to_string);
            response.set_content_type(content_type);
            let body = request.input_stream().copy_to_vec();
            response.write_all_async(&body).await?;
            return Ok(());
        }

        if request.path() != "/upload" && request.path() != "/" {
            response.set_status(StatusCode::NOT_FOUND);
            return Ok(());
        }

        response.set_content_type("text/plain; charset=utf-8");
        writeln!(response, "{} {}", request.method(), request.path())?;
        for (name, values) in request.parameters().iter() {
            writeln!(response, "parameter {name} = {values:?}")?;
        }
        for part in request.parts() {
            let content = request.part_bytes(part);
            writeln!(
                response,
                "file {} ({}), {} bytes, {}",
                part.name,
                part.file_name.as_deref().unwrap_or_default(),
                content.len(),
                part.content_type.as_deref().unwrap_or("application/octet-stream"),
            )?;
        }
        Ok(())
    }
}
