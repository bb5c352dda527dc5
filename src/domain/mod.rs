mod ledger;
mod money;
mod transaction;
mod wallet;

pub use ledger::*;
pub use money::*;
pub use transaction::*;
pub use wallet::*;
