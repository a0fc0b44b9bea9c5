//! Container-backed service facades.
//!
//! A facade is a zero-sized accessor that knows one binding key. Every call
//! resolves the bound service from an explicitly passed [`Container`] and
//! forwards to it.
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use ufacade::{BasicContainer, Facade, Forward, MethodTable, UnderstandFieldProvider};
//!
//! let container = BasicContainer::new();
//! container.singleton(UnderstandFieldProvider::accessor_key(), |_| {
//!     let table = MethodTable::new().method("foo", |args| {
//!         let x = args.first().and_then(|v| v.as_i64()).unwrap_or_default();
//!         Ok(json!(x * 2))
//!     });
//!     Ok(Arc::new(table) as Arc<dyn Forward>)
//! });
//!
//! let out = UnderstandFieldProvider::invoke(&container, "foo", vec![json!(21)]).unwrap();
//! assert_eq!(out, json!(42));
//! ```

// Lets the derive output name `::ufacade` from inside this crate too.
extern crate self as ufacade;

pub mod containers;
pub mod error;
pub mod facades;
pub mod forward;
pub mod interfaces;

pub use containers::basic::{BasicContainer, Scope};
pub use error::{FacadeError, ResolutionError};
pub use facades::field_provider::UnderstandFieldProvider;
pub use forward::{Forward, MethodTable};
pub use interfaces::container::{Container, Instance};
pub use interfaces::facade::Facade;

pub use derives::Facade;
pub use iconfig::{ApplicationConfig, ContainerConfig};
