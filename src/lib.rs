//! Client SDK for a media-conferencing control service.
//!
//! Calls are signed with [`auth`] and carried by the browser-style request
//! object in [`engine`], which runs either asynchronously on Tokio or
//! synchronously through a worker process ([`bridge`]).
//!
//! ```no_run
//! use conference_client_sdk::config::{ClientConfig, RawServiceConfig};
//! use conference_client_sdk::types::{CreateRoomRequest, Page};
//! use conference_client_sdk::Client;
//! use secrecy::SecretString;
//!
//! # async fn run() -> conference_client_sdk::Result<()> {
//! let config = ClientConfig::from_raw(
//!     "https://conference.example:3000/",
//!     RawServiceConfig {
//!         service_id: "my-service".to_owned(),
//!         service_key: SecretString::from("my-key".to_owned()),
//!     },
//! )?;
//! let client = Client::new(config)?;
//!
//! let room = client
//!     .create_room(&CreateRoomRequest::builder().name("standup").build())
//!     .await?;
//! let rooms = client.rooms(Page::default()).await?;
//! # let _ = (room, rooms);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod bridge;
pub mod client;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod error;
mod serde_helpers;
pub mod types;

pub use client::Client;
pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;
