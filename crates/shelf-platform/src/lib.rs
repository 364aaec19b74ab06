pub mod model;
pub mod persistence;
pub mod storage;
