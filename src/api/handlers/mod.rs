pub mod health;
pub use self::health::health;

pub mod root;
pub use self::root::root;

pub mod session;
pub use self::session::{logout, session};
