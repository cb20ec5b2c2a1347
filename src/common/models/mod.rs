mod login_attempt;
mod master_key;
mod session;
mod single_use_token;
mod two_factor;
mod user;
mod webauthn;

pub use login_attempt::*;
pub use master_key::*;
pub use session::*;
pub use single_use_token::*;
pub use two_factor::*;
pub use user::*;
pub use webauthn::*;
