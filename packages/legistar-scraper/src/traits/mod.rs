//! Trait seams: the HTTP transport and per-jurisdiction hooks.

pub mod hooks;
pub mod transport;

pub use hooks::{DefaultHooks, FieldExtractor, GenericFields, JurisdictionHooks, Registry};
pub use transport::{Form, HttpRequest, HttpResponse, Method, Transport};
