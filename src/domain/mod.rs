pub mod club;
pub mod membership;
pub mod membership_request;
pub mod payment;

pub use club::*;
pub use membership::*;
pub use membership_request::*;
pub use payment::*;
