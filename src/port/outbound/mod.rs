//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe the collaborators the gateway consumes:
//! transports, credential validation, session lookup, and system probes.

pub mod limits;
pub mod probe;
pub mod session;
pub mod token;
pub mod transport;
