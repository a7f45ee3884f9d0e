pub mod objects;
pub mod reconcile;
pub mod reindex;
pub mod status;
