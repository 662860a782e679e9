//! Data access: record stores and the Postgres pool.

pub mod business_store {
    pub use crate::business_store::*;
}

pub mod equipment_store {
    pub use crate::equipment_store::*;
}

pub mod db {
    pub use crate::db::*;
}
