//! Loads a dynamic library and lets TCP clients call its exports by name,
//! describing each function's signature at call time.

pub mod config;
pub mod invoke;
pub mod library;
pub mod protocol;
pub mod server;
pub mod signature;

pub use config::ServerConfig;
pub use invoke::{invoke, Value};
pub use library::BridgeLibrary;
pub use server::Server;
pub use signature::{parse_signature, CallingConvention, FunctionSignature, SupportedType};
