mod error;
pub use error::*;

mod safe;
pub use safe::*;

mod safe_deployment;
pub use safe_deployment::*;

mod legacy_funding;
pub use legacy_funding::*;

mod multisig_tx;
pub use multisig_tx::*;

mod token;
pub use token::*;

mod gas_price;
pub use gas_price::*;

mod chain;
pub use chain::*;

mod app_state;
pub use app_state::*;
