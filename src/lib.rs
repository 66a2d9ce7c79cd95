#[path = "../core/entry.rs"]
pub mod entry;

#[path = "../core/fetch.rs"]
pub mod fetch;

#[path = "../core/cache.rs"]
pub mod cache;

#[path = "../core/parser.rs"]
pub mod parser;

#[path = "../core/location.rs"]
pub mod location;

#[path = "../core/naming.rs"]
pub mod naming;

#[path = "../core/uri.rs"]
pub mod uri;

#[path = "../core/pipeline.rs"]
pub mod pipeline;

#[path = "../core/validation.rs"]
pub mod validation;

#[path = "../core/telemetry.rs"]
pub mod telemetry;

#[path = "../core/settings.rs"]
pub mod settings;
