use std::io::{self, Write};

use http::StatusCode;

use crate::buffer::BufferPool;
use crate::protocol::Response;

/// Minimal canned response for errors raised before or instead of dispatch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StockResponse {
    status: StatusCode,
}

impl StockResponse {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn html(&self) -> String {
        let reason = self.status.canonical_reason().unwrap_or("Unknown");
        format!(
            "<html><head><title>{reason}</title></head><body><h1>{code} {reason}</h1></body></html>",
            code = self.status.as_u16()
        )
    }

    /// Builds a complete [`Response`] carrying the HTML page.
    ///
    /// # Errors
    ///
    /// Fails when no pool block can be acquired for the body.
    pub fn into_response(self, pool: BufferPool) -> io::Result<Response> {
        let mut response = Response::new(pool);
        response.set_status(self.status);
        response.set_content_type("text/html");
        response.write_all(self.html().as_bytes())?;
        Ok(response)
    }
}

impl From<StatusCode> for StockResponse {
    fn from(status: StatusCode) -> Self {
        Self::new(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::testing::pool;

    #[test]
    fn html_names_the_status() {
        let html = StockResponse::new(StatusCode::PAYLOAD_TOO_LARGE).html();
        assert!(html.contains("<h1>413 Payload Too Large</h1>"));
    }

    #[test]
    fn response_carries_html_body() {
        let stock = StockResponse::from(StatusCode::BAD_REQUEST);
        let response = stock.into_response(pool(16)).unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.content_type(), Some("text/html"));
        assert_eq!(response.content_length(), stock.html().len());
    }
}
