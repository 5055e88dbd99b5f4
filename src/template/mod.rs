//! Message templating for notification steps
//!
//! Notification bodies and recipients are Jinja2-compatible templates
//! rendered against the run's data record.
//!
//! # Features
//!
//! - Field access: `{{ client_name }}`, `{{ piano.make }}`
//! - Filters: `currency`, `strftime`, `join`, `default`
//! - Conditionals: `{% if overdue %}...{% endif %}`
//!
//! # Example
//!
//! ```ignore
//! use piano_flow::template::TemplateEngine;
//!
//! let engine = TemplateEngine::new();
//! let body = engine.render(
//!     "Hi {{ client_name }}, your invoice of {{ amount | currency }} is due.",
//!     &context.data,
//! )?;
//! ```

mod engine;
mod errors;
mod filters;

pub use engine::TemplateEngine;
pub use errors::TemplateError;
