//! An embeddable WSGI-style HTTP host server (§1): a connection pipeline, a request/
//! response protocol engine, and an app-bridge that dispatches each request either to
//! a hosted application callable or to a static-file responder rooted at a configured
//! directory.

#![forbid(unsafe_code)]

mod builder;
mod connection;
mod date;
mod error;
mod lock;
mod pipeline;
mod route;
mod server;
mod signals;
mod static_file;
mod worker;

pub mod app;
pub mod net;
pub mod proto;

#[cfg(feature = "tls")]
pub mod tls;

pub use app::{Environ, ErrorStream, FileWrapper, InputStream, StartResponse, WsgiApp};
pub use builder::Builder;
pub use error::{Error, Parse, Result};
pub use server::{Server, ServerHandle};

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use std::sync::Arc;

    struct HelloApp;

    impl WsgiApp for HelloApp {
        fn call(
            &self,
            _environ: Environ,
            start_response: &mut StartResponse,
        ) -> std::result::Result<Box<dyn Iterator<Item = std::result::Result<Bytes, String>> + Send>, String> {
            start_response
                .start(StatusCode::OK, vec![("Content-Type".into(), "text/plain".into())], None)
                .map_err(|e| e.to_string())?;
            Ok(Box::new(std::iter::once(Ok(Bytes::from_static(b"Hello World!")))))
        }
    }

    #[test]
    fn builder_wires_an_app_and_a_static_route_before_start() {
        let server = Builder::new().worker_threads(1).build("127.0.0.1:0").unwrap();
        server.set_app(Arc::new(HelloApp));
        server.add_static_route("^/static/", std::env::temp_dir()).unwrap();
        assert!(!server.is_running());
    }
}
