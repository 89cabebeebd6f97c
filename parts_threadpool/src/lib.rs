pub mod errors;
pub mod threadpool;

pub use errors::MultithreadedRuntimeError;
pub use threadpool::ThreadPool;
