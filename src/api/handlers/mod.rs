pub mod callbacks;
pub mod memberships;
pub mod notifications;
pub mod payments;
pub mod requests;
pub mod root;
