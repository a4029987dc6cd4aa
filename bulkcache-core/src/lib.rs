//! BULKCACHE Core - Keys, Declarations, Errors
//!
//! Data types shared by the batch cache coordinator and its collaborators.
//! This crate has no async code and no cache logic: it describes WHAT a bulk
//! operation is, how it was declared, and how it can fail.

pub mod config;
pub mod error;
pub mod key;
pub mod operation;
pub mod signature;

pub use config::{CacheDefaults, CoordinatorConfig};
pub use error::{
    BulkCacheError, BulkCacheResult, ConfigError, ExpressionError, SourceError, StoreError,
};
pub use key::CacheKey;
pub use operation::{
    BulkOperationKind, CacheSource, Expression, KeyStrategy, OperationDeclaration,
    OperationDeclarationBuilder, UnlessScope,
};
pub use signature::{MethodSignature, ParamShape, ReturnShape};
