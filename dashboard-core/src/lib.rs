//! Core library for the `dashboard` client.
//!
//! This crate defines:
//! - The wire model of the backend's `/api/...` routes
//! - An HTTP client behind the [`Backend`] trait
//! - The view controller, its state and reducer
//! - A plain-text renderer for the page
//! - Configuration handling
//!
//! It is used by `dashboard-cli`, but the controller can drive any front-end
//! that can print a `String`.

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod render;
pub mod state;

pub use backend::{Backend, HttpBackend};
pub use config::Config;
pub use controller::{ResponseOrdering, ViewController};
pub use error::FetchError;
pub use model::{EchoMessage, EchoRequest, HealthStatus, User, UsersResponse, WeatherData};
pub use render::render;
pub use state::{Action, ViewState};
