// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod notification_handler {
    pub use crate::notification_handler::*;
}

pub mod payment_handler {
    pub use crate::payment_handler::*;
}

pub use crate::routes::{build_rate_limited_router, build_router};
