mod time;
pub use time::*;

mod redis;
pub use redis::*;

mod distributed_lock;
pub use distributed_lock::*;

mod json_rpc_error;
pub use json_rpc_error::*;
