//! HTTP/1.1 message types and wire codec.
//!
//! - **`request`** / **`response`**: immutable messages with builders
//! - **`body`**: in-memory or stream-backed payloads
//! - **`headers`**: ordered, case-insensitive header map
//! - **`writer`**: serializes a request onto a socket
//! - **`parser`**: parses status lines, header lines and chunk sizes
//! - **`connection`**: a pooled socket to one `(host, port)`
//! - **`url`**: address extraction and redirect resolution
//!
//! # Exchange on a connection
//!
//! ```text
//!        ┌─────────────┐
//!        │   Writing   │ ← request line, headers, blank line, body
//!        └──────┬──────┘
//!               │ flushed
//!               ▼
//!        ┌──────────────────┐
//!        │   Reading head   │ ← status line, headers until blank line
//!        └──────┬───────────┘
//!               │
//!               ▼
//!        ┌──────────────────┐
//!        │   Reading body   │ ← Content-Length / chunked / until EOF
//!        └──────┬───────────┘
//!               ├─ framed body → connection back to the pool
//!               └─ read to EOF or `Connection: close` → connection closed
//! ```

pub mod body;
pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod url;
pub mod writer;

pub use body::{RequestBody, ResponseBody};
pub use headers::Headers;
pub use request::{Method, Request, RequestBuilder};
pub use response::{Response, ResponseBuilder};
