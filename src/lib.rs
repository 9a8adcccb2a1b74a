//! # relaychat
//!
//! A minimal chat client and the single-route relay it talks to.
//!
//! The relay holds the LLM provider credential and exposes `POST /api/chat`
//! on a from-scratch async HTTP/1.1 server. The client side keeps the
//! conversation history, projects it into display rows, and drives each
//! submission from the user's message to the assistant's reply.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use relaychat::llm::{ApiKey, OpenAiClient};
//! use relaychat::relay::{self, RelayService};
//! use relaychat::security::CorsMiddleware;
//! use relaychat::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = OpenAiClient::new(ApiKey::new(std::env::var("OPENAI_API_KEY")?))?;
//!     let service = relay::router(Arc::new(RelayService::new(provider)), CorsMiddleware::default())
//!         .into_service();
//!
//!     let server = Server::bind("127.0.0.1:3001").await?;
//!     server.run_until(move |ctx| service.call(ctx), std::future::pending()).await?;
//!     Ok(())
//! }
//! ```

// ── Relay: HTTP surface ───────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

// ── Relay: upstream + endpoint ────────────────────────────────────────────────
pub mod llm;
pub mod relay;

// ── Client side ───────────────────────────────────────────────────────────────
pub mod conversation;
pub mod terminal;

pub mod config;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
