// Library for tests to access modules

pub mod aggregation;
pub mod artifacts;
pub mod collector;
pub mod config;
pub mod docker_repo;
pub mod gpu_repo;
pub mod models;
pub mod results_repo;
pub mod run_task;
pub mod runner;
pub mod runtime;
pub mod scheduler;
pub mod sink;
pub mod sysinfo_repo;
pub mod workloads;
