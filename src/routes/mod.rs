//! HTTP route handlers grouped by resource domain.
//!
//! Each submodule corresponds to a logical area of the API and exposes
//! typed Rocket handlers. Read-side handlers are annotated with
//! `#[openapi]` so `rocket_okapi` can derive an OpenAPI document; the
//! queue callback endpoint is mounted as a plain route since its raw-body
//! signature check does not fit the generated schema.

pub mod health;
pub mod import;
pub mod links;
