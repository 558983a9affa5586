// Bottree - Convergent documents for shared bot state

pub mod config;
pub mod convergent;
pub mod identity;

pub use config::{ConfigError, DocumentConfig};
pub use convergent::{Document, DocumentError, Node, NodeId, Operation, Patch, Value};
pub use identity::SigningError;
