pub mod candidate_transfer;

pub use candidate_transfer::CandidateTransfer;
pub use paywatch_sdk::objects::TransferStatus;
