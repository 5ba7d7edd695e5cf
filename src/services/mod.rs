pub mod initiator;
pub mod sweeper;

pub use initiator::{DepositInitiated, PaymentInitiator};
pub use sweeper::{ExpirySweeper, SweepReport};
