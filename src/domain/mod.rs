pub mod properties;
pub mod reading;
pub mod source;
pub mod user;

pub use properties::*;
pub use reading::*;
pub use source::*;
pub use user::*;
