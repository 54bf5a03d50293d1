//! Command channel layer (spec.md §4.1): typed create/modify/query/destroy
//! against firmware "general objects", with per-opcode retry policy and the
//! destructor-buffer pattern for tunneled objects.

pub mod channel;
pub mod opcode;
pub mod retry;
pub mod test_fixtures;

pub use channel::{object_create, object_destroy, object_modify, object_query, tunneled_cmd,
    CommandChannel, ObjectHandle};
pub use opcode::{ObjectType, Opcode};
pub use retry::RetryPolicy;
