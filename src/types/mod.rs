pub mod page;
pub mod question;
pub mod session;
