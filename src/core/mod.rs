// Domain-layer modules and shared errors/models
pub mod classifier {
    pub use crate::classifier::*;
}

pub mod coordinator {
    pub use crate::coordinator::*;
}

pub mod eligibility {
    pub use crate::eligibility::*;
}

pub mod errors {
    pub use crate::errors::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod timeline {
    pub use crate::timeline::*;
}
