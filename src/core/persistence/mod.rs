pub mod alerts;
pub mod audit;
pub mod storage_path;
