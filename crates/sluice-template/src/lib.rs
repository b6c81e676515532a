//! Template interpolation and the output-schema DSL.
//!
//! Two support utilities consumed by the pipeline engine and the agent loop:
//!
//! - [`resolve`] interpolates `{{expr}}` placeholders against accumulated
//!   pipeline state (a JSON value). Resolution is a pure function of the
//!   template and the state: resolving twice against the same state yields
//!   the same string.
//! - [`Schema`] parses a compact schema DSL (`string`, `number[]`,
//!   `{name: string, tags?: string[]}`) or its equivalent JSON form, and
//!   validates agent output against it.

pub mod schema;
pub mod template;

pub use schema::{Schema, SchemaError, ValidationResult};
pub use template::{TemplateError, resolve};
