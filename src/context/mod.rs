//! Per-request context handed to middleware and route handlers.

use std::net::SocketAddr;

use crate::Request;

/// A request together with the connection it arrived on.
#[derive(Debug)]
pub struct Context {
    request: Request,
    peer: SocketAddr,
}

impl Context {
    pub fn new(request: Request, peer: SocketAddr) -> Self {
        Self { request, peer }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Remote address of the client connection.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}
