// Domain-layer modules and shared errors/models
pub mod dispatch {
    pub use crate::dispatch::*;
}

pub mod templates {
    pub use crate::templates::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
