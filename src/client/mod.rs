//! HTTP client for asynchronous stage collaborators.

pub mod collaborator;

pub use collaborator::{AsyncCollaboratorClient, CallHeaders};
