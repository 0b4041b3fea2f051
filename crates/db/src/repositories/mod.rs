//! Repositories: one unit struct per table, all methods take `&PgPool`.

mod machine_log_repo;
mod machine_repo;

pub use machine_log_repo::MachineLogRepo;
pub use machine_repo::MachineRepo;
