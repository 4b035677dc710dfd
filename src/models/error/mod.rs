mod repository_error;
pub use repository_error::*;

mod signature;
pub use signature::*;

mod nonce_lock;
pub use nonce_lock::*;

mod relay;
pub use relay::*;
