pub mod money_amount;
pub mod sig_down;

pub use money_amount::{Amount, AmountParseError};
pub use sig_down::SigDown;
