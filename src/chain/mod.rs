pub mod balance;

pub use balance::{BalanceProbe, BalanceSource, FixedBalance};
