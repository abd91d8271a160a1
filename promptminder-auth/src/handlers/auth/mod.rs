pub mod hosted;
pub mod registration;
pub mod session;

pub use hosted::{request_magic_link, request_password_reset, sign_in};
pub use registration::register;
pub use session::{login, logout, me};
