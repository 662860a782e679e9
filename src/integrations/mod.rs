//! External service integrations.

pub mod sms {
    pub use crate::sms::*;
}

pub mod payments {
    pub use crate::payments::*;
}

pub mod analysis {
    pub use crate::analysis::*;
}
