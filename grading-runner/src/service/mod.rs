//! Service layer
//!
//! Services own the per-job resources of the runner: the execution secret
//! that identifies a job and the sandbox directory it names.
//!
//! All services are trait-based to enable testing and dependency injection.

mod sandbox;
mod secret;

// Re-export traits
pub use sandbox::SandboxProvisioner;
pub use secret::SecretFactory;

// Re-export implementations
pub use sandbox::{LocalSandboxProvisioner, SandboxGuard};
pub use secret::{ExecutionSecret, UuidSecretFactory};
