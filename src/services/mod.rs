pub mod access;
pub mod ai;
pub mod content;
pub mod encryption;
pub mod ffmpeg;
pub mod queue;
pub mod storage;
pub mod worker_pool;
pub mod workers_ai;
